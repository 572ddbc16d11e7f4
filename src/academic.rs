use crate::config::{academic_year_of, LifecycleConfig};
use crate::error::Result;
use crate::host::CourseCatalog;
use chrono::{DateTime, Utc};

pub const CLC_CATEGORY: &str = "CLC";

pub const ACADEMIC_YEAR_FIELD: &str = "course_year";

pub fn academic_year_field_id(
    catalog: &impl CourseCatalog,
    config: &LifecycleConfig,
) -> Result<Option<i64>> {
    if let Some(id) = config.clc_field_id {
        return Ok(Some(id));
    }
    Ok(catalog
        .clc_text_fields()?
        .into_iter()
        .find(|f| f.shortname == ACADEMIC_YEAR_FIELD)
        .map(|f| f.id))
}

pub fn potential_academic_years(
    catalog: &impl CourseCatalog,
    config: &LifecycleConfig,
) -> Result<Vec<String>> {
    match academic_year_field_id(catalog, config)? {
        Some(field_id) => catalog.field_values(field_id),
        None => Ok(Vec::new()),
    }
}

pub fn current_academic_year(now: DateTime<Utc>, config: &LifecycleConfig) -> i32 {
    academic_year_of(now.date_naive(), config.academic_year_start)
}

pub fn is_academic_year_tag(s: &str) -> bool {
    s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit())
}
