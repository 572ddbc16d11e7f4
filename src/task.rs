use crate::academic::academic_year_field_id;
use crate::actuator::{freeze, FreezeOutcome};
use crate::config::LifecycleConfig;
use crate::engine::EligibilityEngine;
use crate::error::Result;
use crate::host::Host;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn};
use uuid::Uuid;

pub const TASK_NAME: &str = "Task to freeze course context";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FrozenCourse {
    pub course_id: i64,
    pub fullname: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailedCourse {
    pub course_id: i64,
    pub fullname: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub run_id: String,
    pub enabled: bool,
    pub frozen: Vec<FrozenCourse>,
    pub failed: Vec<FailedCourse>,
}

/// Runs one sweep. A course that fails to freeze is recorded and skipped;
/// only failures to list candidates abort the run.
pub fn run_freeze_context_task(host: &impl Host, now: DateTime<Utc>) -> Result<SweepReport> {
    let run_id = Uuid::new_v4().to_string();
    let span = info_span!("freeze_context", run_id = %run_id);
    let _guard = span.enter();

    let config = LifecycleConfig::load(host)?;
    let mut report = SweepReport {
        run_id,
        enabled: config.scheduled_task_enabled,
        frozen: Vec::new(),
        failed: Vec::new(),
    };
    if !config.scheduled_task_enabled {
        info!("scheduled freezing disabled");
        return Ok(report);
    }

    let year_field = academic_year_field_id(host, &config)?;
    let engine = EligibilityEngine::new(&config, now);
    let courses = engine.list_courses_eligible_now(host, year_field)?;
    info!(candidates = courses.len(), "{}", TASK_NAME);

    for course in courses {
        match freeze(host, course.id) {
            Ok(FreezeOutcome::Frozen) | Ok(FreezeOutcome::AlreadyFrozen) => {
                info!("{}_{} is frozen now.", course.id, course.fullname);
                report.frozen.push(FrozenCourse {
                    course_id: course.id,
                    fullname: course.fullname,
                });
            }
            Err(e) => {
                warn!(course_id = course.id, error = %e, "failed to freeze course");
                report.failed.push(FailedCourse {
                    course_id: course.id,
                    fullname: course.fullname,
                    message: e.to_string(),
                });
            }
        }
    }
    Ok(report)
}
