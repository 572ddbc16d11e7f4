use crate::db::SYSTEM_CONTEXT_ID;
use crate::error::{LifecycleError, Result};
use crate::host::{
    ConfigStore, ContextLevel, ContextRecord, Course, CourseCatalog, CustomField,
    FreezePreference, LockableScope, PermissionOracle, PreferenceStore, SITE_COURSE_ID,
};
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

const COURSE_COLUMNS: &str =
    "c.id, c.category, c.fullname, c.shortname, c.startdate, c.enddate, cd.value";

pub struct SqliteHost<'a> {
    conn: &'a Connection,
}

#[derive(Debug, Clone, Default)]
pub struct NewCourse {
    pub category: i64,
    pub fullname: String,
    pub shortname: String,
    pub startdate: i64,
    pub enddate: i64,
    pub custom_fields: BTreeMap<String, String>,
}

fn course_from_row(row: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: row.get(0)?,
        category: row.get(1)?,
        fullname: row.get(2)?,
        shortname: row.get(3)?,
        startdate: row.get(4)?,
        enddate: row.get(5)?,
        academic_year: row.get(6)?,
    })
}

fn context_from_row(row: &Row<'_>) -> rusqlite::Result<ContextRecord> {
    let level: i64 = row.get(1)?;
    Ok(ContextRecord {
        id: row.get(0)?,
        level: ContextLevel::from_i64(level).unwrap_or(ContextLevel::System),
        instance_id: row.get(2)?,
        parent_id: row.get(3)?,
        locked: row.get::<_, i64>(4)? != 0,
    })
}

fn preference_from_row(row: &Row<'_>) -> rusqlite::Result<FreezePreference> {
    let freezedate: i64 = row.get(3)?;
    Ok(FreezePreference {
        id: row.get(0)?,
        courseid: row.get(1)?,
        freezeexcluded: row.get::<_, i64>(2)? != 0,
        freezedate: (freezedate > 0).then_some(freezedate),
        timecreated: row.get(4)?,
        timemodified: row.get(5)?,
    })
}

impl<'a> SqliteHost<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn context(&self, context_id: i64) -> Result<Option<ContextRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, contextlevel, instanceid, parentid, locked FROM context WHERE id = ?",
                [context_id],
                context_from_row,
            )
            .optional()?)
    }

    fn category_context_id(&self, category_id: i64) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM context WHERE contextlevel = ? AND instanceid = ?",
                (ContextLevel::CourseCategory.as_i64(), category_id),
                |r| r.get(0),
            )
            .optional()?)
    }

    fn insert_context(&self, level: ContextLevel, instance_id: i64, parent_id: i64) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO context(contextlevel, instanceid, parentid, locked) VALUES(?, ?, ?, 0)",
            (level.as_i64(), instance_id, parent_id),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn create_category(&self, name: &str, parent: Option<i64>) -> Result<(i64, i64)> {
        let parent_context = match parent {
            Some(p) => self
                .category_context_id(p)?
                .ok_or_else(|| anyhow::anyhow!("category {p} not found"))?,
            None => SYSTEM_CONTEXT_ID,
        };
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO course_categories(name, parent) VALUES(?, ?)",
            (name, parent.unwrap_or(0)),
        )?;
        let category_id = tx.last_insert_rowid();
        let context_id =
            self.insert_context(ContextLevel::CourseCategory, category_id, parent_context)?;
        tx.commit()?;
        Ok((category_id, context_id))
    }

    pub fn create_course(&self, course: &NewCourse) -> Result<(i64, i64)> {
        let parent_context = if course.category == 0 {
            SYSTEM_CONTEXT_ID
        } else {
            self.category_context_id(course.category)?
                .ok_or_else(|| anyhow::anyhow!("category {} not found", course.category))?
        };

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO course(category, fullname, shortname, startdate, enddate)
             VALUES(?, ?, ?, ?, ?)",
            (
                course.category,
                &course.fullname,
                &course.shortname,
                course.startdate,
                course.enddate,
            ),
        )?;
        let course_id = tx.last_insert_rowid();
        let context_id = self.insert_context(ContextLevel::Course, course_id, parent_context)?;

        for (shortname, value) in &course.custom_fields {
            let field_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM customfield_field WHERE shortname = ? ORDER BY id LIMIT 1",
                    [shortname],
                    |r| r.get(0),
                )
                .optional()?;
            let Some(field_id) = field_id else {
                return Err(anyhow::anyhow!("unknown custom field: {shortname}").into());
            };
            tx.execute(
                "INSERT INTO customfield_data(fieldid, instanceid, value) VALUES(?, ?, ?)",
                (field_id, course_id, value),
            )?;
        }
        tx.commit()?;
        Ok((course_id, context_id))
    }

    pub fn create_customfield_category(&self, name: &str) -> Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM customfield_category WHERE name = ? AND component = 'core_course' AND area = 'course'",
                [name],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        self.conn
            .execute("INSERT INTO customfield_category(name) VALUES(?)", [name])?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn create_customfield(
        &self,
        category_id: i64,
        shortname: &str,
        name: &str,
        field_type: &str,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO customfield_field(shortname, name, type, categoryid) VALUES(?, ?, ?, ?)",
            (shortname, name, field_type, category_id),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn grant_capability(&self, user_id: i64, context_id: i64, capability: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO capability_grants(userid, contextid, capability) VALUES(?, ?, ?)",
            (user_id, context_id, capability),
        )?;
        Ok(())
    }
}

impl CourseCatalog for SqliteHost<'_> {
    fn get_course(&self, course_id: i64, year_field: Option<i64>) -> Result<Option<Course>> {
        let sql = format!(
            "SELECT {COURSE_COLUMNS}
             FROM course c
             LEFT JOIN customfield_data cd ON cd.instanceid = c.id AND cd.fieldid = ?2
             WHERE c.id = ?1"
        );
        Ok(self
            .conn
            .query_row(&sql, (course_id, year_field), course_from_row)
            .optional()?)
    }

    fn freeze_candidates(&self, ended_before: i64, year_field: Option<i64>) -> Result<Vec<Course>> {
        let sql = format!(
            "SELECT {COURSE_COLUMNS}
             FROM course c
             JOIN context ctx ON ctx.instanceid = c.id AND ctx.contextlevel = ?3
             LEFT JOIN customfield_data cd ON cd.instanceid = c.id AND cd.fieldid = ?2
             WHERE c.id <> ?4
               AND ctx.locked = 0
               AND c.enddate > 0
               AND c.enddate < ?1
             ORDER BY c.id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                (
                    ended_before,
                    year_field,
                    ContextLevel::Course.as_i64(),
                    SITE_COURSE_ID,
                ),
                course_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn clc_text_fields(&self) -> Result<Vec<CustomField>> {
        let mut stmt = self.conn.prepare(
            "SELECT cf.id, cf.shortname
             FROM customfield_field cf
             JOIN customfield_category cc ON cf.categoryid = cc.id
             WHERE cc.name = ? AND cf.type = 'text'
             ORDER BY cf.id",
        )?;
        let rows = stmt
            .query_map([crate::academic::CLC_CATEGORY], |r| {
                Ok(CustomField {
                    id: r.get(0)?,
                    shortname: r.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn field_values(&self, field_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT value
             FROM customfield_data
             WHERE fieldid = ? AND value IS NOT NULL AND value <> ''
             ORDER BY value DESC",
        )?;
        let rows = stmt
            .query_map([field_id], |r| r.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl LockableScope for SqliteHost<'_> {
    fn course_context(&self, course_id: i64) -> Result<Option<ContextRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, contextlevel, instanceid, parentid, locked
                 FROM context WHERE contextlevel = ? AND instanceid = ?",
                (ContextLevel::Course.as_i64(), course_id),
                context_from_row,
            )
            .optional()?)
    }

    fn is_locked(&self, context_id: i64) -> Result<bool> {
        let locked: Option<i64> = self
            .conn
            .query_row(
                "SELECT locked FROM context WHERE id = ?",
                [context_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(locked.unwrap_or(0) != 0)
    }

    fn set_locked(&self, context_id: i64, locked: bool) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE context SET locked = ? WHERE id = ?",
            (locked as i64, context_id),
        )?;
        if changed == 0 {
            return Err(anyhow::anyhow!("context {context_id} not found").into());
        }
        Ok(())
    }

    fn get_parent(&self, context_id: i64) -> Result<Option<i64>> {
        let parent: Option<Option<i64>> = self
            .conn
            .query_row(
                "SELECT parentid FROM context WHERE id = ?",
                [context_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(parent.flatten())
    }
}

impl PermissionOracle for SqliteHost<'_> {
    /// Grants are inherited down the context tree.
    fn has_capability(&self, user_id: i64, capability: &str, context_id: i64) -> Result<bool> {
        let found: i64 = self.conn.query_row(
            "WITH RECURSIVE path(id) AS (
               SELECT ?2
               UNION ALL
               SELECT c.parentid FROM context c JOIN path p ON c.id = p.id
               WHERE c.parentid IS NOT NULL
             )
             SELECT EXISTS(
               SELECT 1 FROM capability_grants g JOIN path p ON g.contextid = p.id
               WHERE g.userid = ?1 AND g.capability = ?3
             )",
            (user_id, context_id, capability),
            |r| r.get(0),
        )?;
        Ok(found != 0)
    }
}

impl ConfigStore for SqliteHost<'_> {
    fn get_config(&self, plugin: &str, name: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM config_plugins WHERE plugin = ? AND name = ?",
                (plugin, name),
                |r| r.get(0),
            )
            .optional()?)
    }

    fn set_config(&self, plugin: &str, name: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO config_plugins(plugin, name, value) VALUES(?, ?, ?)
             ON CONFLICT(plugin, name) DO UPDATE SET value = excluded.value",
            (plugin, name, value),
        )?;
        Ok(())
    }

    fn plugin_config(&self, plugin: &str) -> Result<BTreeMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, value FROM config_plugins WHERE plugin = ?")?;
        let rows = stmt
            .query_map([plugin], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
        Ok(rows)
    }
}

impl PreferenceStore for SqliteHost<'_> {
    fn get_preference(&self, course_id: i64) -> Result<Option<FreezePreference>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, courseid, freezeexcluded, freezedate, timecreated, timemodified
                 FROM block_lifecycle WHERE courseid = ?",
                [course_id],
                preference_from_row,
            )
            .optional()?)
    }

    fn insert_preference(&self, pref: &FreezePreference) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO block_lifecycle(courseid, freezeexcluded, freezedate, timecreated, timemodified)
             VALUES(?, ?, ?, ?, ?)",
            (
                pref.courseid,
                pref.freezeexcluded as i64,
                pref.freezedate.unwrap_or(0),
                pref.timecreated,
                pref.timemodified,
            ),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_preference(&self, pref: &FreezePreference) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE block_lifecycle
             SET freezeexcluded = ?, freezedate = ?, timemodified = ?
             WHERE courseid = ?",
            (
                pref.freezeexcluded as i64,
                pref.freezedate.unwrap_or(0),
                pref.timemodified,
                pref.courseid,
            ),
        )?;
        if changed == 0 {
            return Err(LifecycleError::Other(anyhow::anyhow!(
                "no preference row for course {}",
                pref.courseid
            )));
        }
        Ok(())
    }
}
