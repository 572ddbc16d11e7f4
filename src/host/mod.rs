//! Host collaborators. `store::SqliteHost` implements them over SQL; unit
//! tests use the in-memory double in `memory`.

#[cfg(test)]
pub mod memory;

use crate::error::Result;
use std::collections::BTreeMap;

pub const PLUGIN: &str = "block_lifecycle";

pub const SITE_COURSE_ID: i64 = 1;

pub const CAP_UNFREEZE: &str = "block/lifecycle:unfreezecoursecontext";
pub const CAP_OVERRIDE: &str = "block/lifecycle:overridecontextfreeze";
pub const CAP_VIEW: &str = "block/lifecycle:view";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextLevel {
    System,
    CourseCategory,
    Course,
}

impl ContextLevel {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::System => 10,
            Self::CourseCategory => 40,
            Self::Course => 50,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            10 => Some(Self::System),
            40 => Some(Self::CourseCategory),
            50 => Some(Self::Course),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    pub id: i64,
    pub category: i64,
    pub fullname: String,
    pub shortname: String,
    pub startdate: i64,
    pub enddate: i64,
    pub academic_year: Option<String>,
}

impl Course {
    pub fn end_date(&self) -> Option<i64> {
        (self.enddate > 0).then_some(self.enddate)
    }

    pub fn academic_year(&self) -> Option<&str> {
        self.academic_year
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRecord {
    pub id: i64,
    pub level: ContextLevel,
    pub instance_id: i64,
    pub parent_id: Option<i64>,
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomField {
    pub id: i64,
    pub shortname: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreezePreference {
    pub id: i64,
    pub courseid: i64,
    pub freezeexcluded: bool,
    pub freezedate: Option<i64>,
    pub timecreated: i64,
    pub timemodified: i64,
}

pub trait CourseCatalog {
    fn get_course(&self, course_id: i64, year_field: Option<i64>) -> Result<Option<Course>>;

    /// Non-site courses in an unlocked course context whose end date is set
    /// and strictly before `ended_before`.
    fn freeze_candidates(&self, ended_before: i64, year_field: Option<i64>) -> Result<Vec<Course>>;

    fn clc_text_fields(&self) -> Result<Vec<CustomField>>;

    fn field_values(&self, field_id: i64) -> Result<Vec<String>>;
}

pub trait LockableScope {
    fn course_context(&self, course_id: i64) -> Result<Option<ContextRecord>>;

    fn is_locked(&self, context_id: i64) -> Result<bool>;

    fn set_locked(&self, context_id: i64, locked: bool) -> Result<()>;

    fn get_parent(&self, context_id: i64) -> Result<Option<i64>>;

    /// Nearest ancestor of `context_id` that carries its own lock.
    fn locked_ancestor(&self, context_id: i64) -> Result<Option<i64>> {
        let mut current = self.get_parent(context_id)?;
        while let Some(id) = current {
            if self.is_locked(id)? {
                return Ok(Some(id));
            }
            current = self.get_parent(id)?;
        }
        Ok(None)
    }
}

pub trait PermissionOracle {
    fn has_capability(&self, user_id: i64, capability: &str, context_id: i64) -> Result<bool>;
}

pub trait ConfigStore {
    fn get_config(&self, plugin: &str, name: &str) -> Result<Option<String>>;

    fn set_config(&self, plugin: &str, name: &str, value: &str) -> Result<()>;

    fn plugin_config(&self, plugin: &str) -> Result<BTreeMap<String, String>>;
}

pub trait PreferenceStore {
    fn get_preference(&self, course_id: i64) -> Result<Option<FreezePreference>>;

    fn insert_preference(&self, pref: &FreezePreference) -> Result<i64>;

    fn update_preference(&self, pref: &FreezePreference) -> Result<()>;
}

pub trait Host: CourseCatalog + LockableScope + PermissionOracle + ConfigStore + PreferenceStore {}

impl<T> Host for T where
    T: CourseCatalog + LockableScope + PermissionOracle + ConfigStore + PreferenceStore
{
}
