use crate::host::{ContextLevel, SITE_COURSE_ID};
use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "lifecycle.sqlite3";
pub const SYSTEM_CONTEXT_ID: i64 = 1;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS context(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            contextlevel INTEGER NOT NULL,
            instanceid INTEGER NOT NULL,
            parentid INTEGER,
            locked INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(parentid) REFERENCES context(id),
            UNIQUE(contextlevel, instanceid)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_context_parent ON context(parentid)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_categories(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            parent INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS course(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category INTEGER NOT NULL DEFAULT 0,
            fullname TEXT NOT NULL,
            shortname TEXT NOT NULL,
            startdate INTEGER NOT NULL DEFAULT 0,
            enddate INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_course_enddate ON course(enddate)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS customfield_category(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            component TEXT NOT NULL DEFAULT 'core_course',
            area TEXT NOT NULL DEFAULT 'course'
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS customfield_field(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            shortname TEXT NOT NULL,
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            categoryid INTEGER NOT NULL,
            FOREIGN KEY(categoryid) REFERENCES customfield_category(id),
            UNIQUE(categoryid, shortname)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS customfield_data(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fieldid INTEGER NOT NULL,
            instanceid INTEGER NOT NULL,
            value TEXT,
            FOREIGN KEY(fieldid) REFERENCES customfield_field(id),
            UNIQUE(fieldid, instanceid)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_customfield_data_instance ON customfield_data(instanceid)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS config_plugins(
            plugin TEXT NOT NULL,
            name TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY(plugin, name)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS capability_grants(
            userid INTEGER NOT NULL,
            contextid INTEGER NOT NULL,
            capability TEXT NOT NULL,
            PRIMARY KEY(userid, contextid, capability),
            FOREIGN KEY(contextid) REFERENCES context(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS block_lifecycle(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            courseid INTEGER NOT NULL UNIQUE,
            freezeexcluded INTEGER NOT NULL DEFAULT 0,
            freezedate INTEGER NOT NULL DEFAULT 0,
            timecreated INTEGER NOT NULL,
            timemodified INTEGER NOT NULL
        )",
        [],
    )?;

    seed_site(&conn)?;

    Ok(conn)
}

fn seed_site(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO context(id, contextlevel, instanceid, parentid, locked)
         VALUES(?, ?, 0, NULL, 0)",
        (SYSTEM_CONTEXT_ID, ContextLevel::System.as_i64()),
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO course(id, category, fullname, shortname, startdate, enddate)
         VALUES(?, 0, 'Site', 'site', 0, 0)",
        [SITE_COURSE_ID],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO context(contextlevel, instanceid, parentid, locked)
         VALUES(?, ?, ?, 0)",
        (
            ContextLevel::Course.as_i64(),
            SITE_COURSE_ID,
            SYSTEM_CONTEXT_ID,
        ),
    )?;
    Ok(())
}
