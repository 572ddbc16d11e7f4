use super::*;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

const SYSTEM_CONTEXT_ID: i64 = 1;

#[derive(Default)]
pub struct MemoryHost {
    courses: RefCell<Vec<Course>>,
    contexts: RefCell<HashMap<i64, ContextRecord>>,
    grants: RefCell<BTreeSet<(i64, String, i64)>>,
    config: RefCell<BTreeMap<(String, String), String>>,
    prefs: RefCell<Vec<FreezePreference>>,
    fields: RefCell<Vec<CustomField>>,
    field_data: RefCell<Vec<(i64, i64, String)>>,
    pub fail_writes: std::cell::Cell<bool>,
}

impl MemoryHost {
    pub fn new() -> Self {
        let host = Self::default();
        host.contexts.borrow_mut().insert(
            SYSTEM_CONTEXT_ID,
            ContextRecord {
                id: SYSTEM_CONTEXT_ID,
                level: ContextLevel::System,
                instance_id: 0,
                parent_id: None,
                locked: false,
            },
        );
        host
    }

    fn next_context_id(&self) -> i64 {
        self.contexts.borrow().keys().max().copied().unwrap_or(0) + 1
    }

    pub fn add_category(&self, category_id: i64) -> i64 {
        let id = self.next_context_id();
        self.contexts.borrow_mut().insert(
            id,
            ContextRecord {
                id,
                level: ContextLevel::CourseCategory,
                instance_id: category_id,
                parent_id: Some(SYSTEM_CONTEXT_ID),
                locked: false,
            },
        );
        id
    }

    pub fn add_course(&self, course: Course, parent_context: i64) -> i64 {
        let id = self.next_context_id();
        self.contexts.borrow_mut().insert(
            id,
            ContextRecord {
                id,
                level: ContextLevel::Course,
                instance_id: course.id,
                parent_id: Some(parent_context),
                locked: false,
            },
        );
        self.courses.borrow_mut().push(course);
        id
    }

    pub fn add_field(&self, id: i64, shortname: &str) {
        self.fields.borrow_mut().push(CustomField {
            id,
            shortname: shortname.to_string(),
        });
    }

    pub fn add_field_value(&self, field_id: i64, course_id: i64, value: &str) {
        self.field_data
            .borrow_mut()
            .push((field_id, course_id, value.to_string()));
    }

    pub fn grant(&self, user_id: i64, capability: &str, context_id: i64) {
        self.grants
            .borrow_mut()
            .insert((user_id, capability.to_string(), context_id));
    }

    pub fn context(&self, context_id: i64) -> ContextRecord {
        self.contexts.borrow()[&context_id].clone()
    }

    pub fn preference_count(&self) -> usize {
        self.prefs.borrow().len()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.get() {
            return Err(anyhow::anyhow!("simulated write failure").into());
        }
        Ok(())
    }
}

impl CourseCatalog for MemoryHost {
    fn get_course(&self, course_id: i64, _year_field: Option<i64>) -> Result<Option<Course>> {
        Ok(self
            .courses
            .borrow()
            .iter()
            .find(|c| c.id == course_id)
            .cloned())
    }

    fn freeze_candidates(&self, ended_before: i64, _year_field: Option<i64>) -> Result<Vec<Course>> {
        let contexts = self.contexts.borrow();
        Ok(self
            .courses
            .borrow()
            .iter()
            .filter(|c| c.id != SITE_COURSE_ID && c.enddate > 0 && c.enddate < ended_before)
            .filter(|c| {
                contexts.values().any(|ctx| {
                    ctx.level == ContextLevel::Course && ctx.instance_id == c.id && !ctx.locked
                })
            })
            .cloned()
            .collect())
    }

    fn clc_text_fields(&self) -> Result<Vec<CustomField>> {
        Ok(self.fields.borrow().clone())
    }

    fn field_values(&self, field_id: i64) -> Result<Vec<String>> {
        let values: BTreeSet<String> = self
            .field_data
            .borrow()
            .iter()
            .filter(|(f, _, v)| *f == field_id && !v.is_empty())
            .map(|(_, _, v)| v.clone())
            .collect();
        Ok(values.into_iter().rev().collect())
    }
}

impl LockableScope for MemoryHost {
    fn course_context(&self, course_id: i64) -> Result<Option<ContextRecord>> {
        Ok(self
            .contexts
            .borrow()
            .values()
            .find(|ctx| ctx.level == ContextLevel::Course && ctx.instance_id == course_id)
            .cloned())
    }

    fn is_locked(&self, context_id: i64) -> Result<bool> {
        Ok(self
            .contexts
            .borrow()
            .get(&context_id)
            .map(|ctx| ctx.locked)
            .unwrap_or(false))
    }

    fn set_locked(&self, context_id: i64, locked: bool) -> Result<()> {
        self.check_writable()?;
        if let Some(ctx) = self.contexts.borrow_mut().get_mut(&context_id) {
            ctx.locked = locked;
        }
        Ok(())
    }

    fn get_parent(&self, context_id: i64) -> Result<Option<i64>> {
        Ok(self
            .contexts
            .borrow()
            .get(&context_id)
            .and_then(|ctx| ctx.parent_id))
    }
}

impl PermissionOracle for MemoryHost {
    fn has_capability(&self, user_id: i64, capability: &str, context_id: i64) -> Result<bool> {
        let grants = self.grants.borrow();
        let mut current = Some(context_id);
        while let Some(id) = current {
            if grants.contains(&(user_id, capability.to_string(), id)) {
                return Ok(true);
            }
            current = self.get_parent(id)?;
        }
        Ok(false)
    }
}

impl ConfigStore for MemoryHost {
    fn get_config(&self, plugin: &str, name: &str) -> Result<Option<String>> {
        Ok(self
            .config
            .borrow()
            .get(&(plugin.to_string(), name.to_string()))
            .cloned())
    }

    fn set_config(&self, plugin: &str, name: &str, value: &str) -> Result<()> {
        self.config
            .borrow_mut()
            .insert((plugin.to_string(), name.to_string()), value.to_string());
        Ok(())
    }

    fn plugin_config(&self, plugin: &str) -> Result<BTreeMap<String, String>> {
        Ok(self
            .config
            .borrow()
            .iter()
            .filter(|((p, _), _)| p == plugin)
            .map(|((_, n), v)| (n.clone(), v.clone()))
            .collect())
    }
}

impl PreferenceStore for MemoryHost {
    fn get_preference(&self, course_id: i64) -> Result<Option<FreezePreference>> {
        Ok(self
            .prefs
            .borrow()
            .iter()
            .find(|p| p.courseid == course_id)
            .cloned())
    }

    fn insert_preference(&self, pref: &FreezePreference) -> Result<i64> {
        self.check_writable()?;
        let mut prefs = self.prefs.borrow_mut();
        let id = prefs.len() as i64 + 1;
        prefs.push(FreezePreference { id, ..pref.clone() });
        Ok(id)
    }

    fn update_preference(&self, pref: &FreezePreference) -> Result<()> {
        self.check_writable()?;
        if let Some(row) = self
            .prefs
            .borrow_mut()
            .iter_mut()
            .find(|p| p.courseid == pref.courseid)
        {
            *row = pref.clone();
        }
        Ok(())
    }
}
