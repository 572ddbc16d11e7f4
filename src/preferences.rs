use crate::config::{parse_config_date, MSG_DATE_FORMAT};
use crate::engine::{date_to_datetime, EligibilityEngine, FurthestDefaultDate};
use crate::error::{LifecycleError, Result};
use crate::host::{Course, FreezePreference, LockableScope, PermissionOracle, PreferenceStore, CAP_OVERRIDE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

pub const MSG_UPDATED: &str = "Auto read only settings updated successfully.";
pub const MSG_UPDATE_FAILED: &str = "Failed to update read only settings.";
pub const MSG_NO_SUGGESTED_DATE: &str = "Could not get the automatically suggested date.";
pub const MSG_OVERRIDE_IN_PAST: &str = "The date for a Read-Only override must be in the future.";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferenceUpdate {
    /// Automatic freezing enabled. Stored inverted as `freezeexcluded`.
    pub togglefreeze: bool,
    #[serde(default)]
    pub delayfreezedate: Option<String>,
}

impl PreferenceUpdate {
    pub fn freeze_excluded(&self) -> bool {
        !self.togglefreeze
    }

    pub fn override_date(&self) -> Result<Option<DateTime<Utc>>> {
        if self.freeze_excluded() {
            return Ok(None);
        }
        let raw = self.delayfreezedate.as_deref().map(str::trim).unwrap_or("");
        if raw.is_empty() {
            return Ok(None);
        }
        parse_config_date(raw)
            .map(|d| Some(date_to_datetime(d)))
            .ok_or_else(|| LifecycleError::InvalidOverride(MSG_DATE_FORMAT.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub success: bool,
    pub message: String,
}

impl UpdateOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

pub fn validate_override(
    default_date: &FurthestDefaultDate,
    override_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    let Some(default_date) = default_date.known() else {
        return Err(LifecycleError::InvalidOverride(MSG_NO_SUGGESTED_DATE.into()));
    };
    if override_date <= default_date {
        return Err(LifecycleError::InvalidOverride(format!(
            "The date for a Read-Only override must be post the automatically suggested date ({}), earlier dates may not be used.",
            default_date.format("%Y-%m-%d")
        )));
    }
    if override_date <= now {
        return Err(LifecycleError::InvalidOverride(MSG_OVERRIDE_IN_PAST.into()));
    }
    Ok(())
}

pub fn upsert_preference(
    store: &impl PreferenceStore,
    course_id: i64,
    freezeexcluded: bool,
    freezedate: Option<i64>,
    now: i64,
) -> Result<FreezePreference> {
    match store.get_preference(course_id)? {
        Some(existing) => {
            let updated = FreezePreference {
                freezeexcluded,
                freezedate,
                timemodified: now,
                ..existing
            };
            store.update_preference(&updated)?;
            Ok(updated)
        }
        None => {
            let mut row = FreezePreference {
                id: 0,
                courseid: course_id,
                freezeexcluded,
                freezedate,
                timecreated: now,
                timemodified: now,
            };
            row.id = store.insert_preference(&row)?;
            Ok(row)
        }
    }
}

pub fn save_preferences(
    store: &impl PreferenceStore,
    engine: &EligibilityEngine<'_>,
    course: &Course,
    update: &PreferenceUpdate,
) -> UpdateOutcome {
    let override_date = match update.override_date() {
        Ok(d) => d,
        Err(e) => return UpdateOutcome::failed(e.to_string()),
    };
    if let Some(date) = override_date {
        let default_date = engine.compute_furthest_default_date(course);
        if let Err(e) = validate_override(&default_date, date, engine.now()) {
            warn!(course_id = course.id, error = %e, "override rejected");
            return UpdateOutcome::failed(e.to_string());
        }
    }

    match upsert_preference(
        store,
        course.id,
        update.freeze_excluded(),
        override_date.map(|d| d.timestamp()),
        engine.now().timestamp(),
    ) {
        Ok(row) => {
            info!(
                course_id = course.id,
                freezeexcluded = row.freezeexcluded,
                freezedate = row.freezedate,
                "freeze preferences saved"
            );
            UpdateOutcome::ok(MSG_UPDATED)
        }
        Err(e) => {
            error!(course_id = course.id, error = %e, "failed to save freeze preferences");
            UpdateOutcome::failed(MSG_UPDATE_FAILED)
        }
    }
}

pub fn update_auto_freezing_preferences<H>(
    host: &H,
    engine: &EligibilityEngine<'_>,
    course: &Course,
    user_id: i64,
    update: &PreferenceUpdate,
) -> UpdateOutcome
where
    H: PreferenceStore + LockableScope + PermissionOracle,
{
    let allowed = host.course_context(course.id).and_then(|ctx| match ctx {
        Some(ctx) => host.has_capability(user_id, CAP_OVERRIDE, ctx.id),
        None => Err(LifecycleError::ContextNotFound(course.id)),
    });
    match allowed {
        Ok(true) => save_preferences(host, engine, course, update),
        Ok(false) => UpdateOutcome::failed(
            LifecycleError::PermissionDenied {
                capability: CAP_OVERRIDE.to_string(),
            }
            .to_string(),
        ),
        Err(e) => {
            error!(course_id = course.id, error = %e, "capability check failed");
            UpdateOutcome::failed(MSG_UPDATE_FAILED)
        }
    }
}
