use crate::academic::academic_year_field_id;
use crate::actuator::{self, MSG_UNFROZEN};
use crate::config::LifecycleConfig;
use crate::engine::{timestamp_to_datetime, EligibilityEngine, Schedule};
use crate::error::LifecycleError;
use crate::host::{
    Course, CourseCatalog, LockableScope, PermissionOracle, PreferenceStore, CAP_OVERRIDE,
    CAP_UNFREEZE, CAP_VIEW,
};
use crate::ipc::error::{err, lifecycle_err, ok};
use crate::ipc::helpers::{param_i64, require_db};
use crate::ipc::types::{AppState, Request};
use crate::preferences::{update_auto_freezing_preferences, PreferenceUpdate, MSG_NO_SUGGESTED_DATE};
use crate::store::SqliteHost;
use crate::task::run_freeze_context_task;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

fn ymd(ts: i64) -> Option<String> {
    timestamp_to_datetime(ts).map(|d| d.format("%Y-%m-%d").to_string())
}

fn load_course(
    host: &SqliteHost<'_>,
    req: &Request,
    course_id: i64,
) -> Result<(LifecycleConfig, Course), Value> {
    let loaded = LifecycleConfig::load(host).and_then(|config| {
        let year_field = academic_year_field_id(host, &config)?;
        let course = host
            .get_course(course_id, year_field)?
            .ok_or(LifecycleError::CourseNotFound(course_id))?;
        Ok((config, course))
    });
    loaded.map_err(|e| lifecycle_err(&req.id, &e))
}

fn handle_get_scheduled_freeze_date(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let course_id = match param_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let host = SqliteHost::new(conn);
    let (config, course) = match load_course(&host, req, course_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let preference = match host.get_preference(course_id) {
        Ok(p) => p,
        Err(e) => return lifecycle_err(&req.id, &e),
    };

    let engine = EligibilityEngine::new(&config, Utc::now());
    match engine.scheduled_freeze_date(&course, preference.as_ref()) {
        Schedule::Scheduled(s) => ok(
            &req.id,
            json!({
                "success": true,
                "defaultfreezedate": s.default_date_string(),
                "scheduledfreezedate": s.scheduled_date_string(),
                "source": s.source.as_str(),
            }),
        ),
        Schedule::Undeterminable(reason) => ok(
            &req.id,
            json!({
                "success": false,
                "scheduledfreezedate": MSG_NO_SUGGESTED_DATE,
                "reason": format!("{reason:?}"),
            }),
        ),
    }
}

fn parse_preferences(req: &Request) -> Result<PreferenceUpdate, Value> {
    let raw = req.params.get("preferences").cloned().unwrap_or(Value::Null);
    // The form posts the payload JSON-encoded; accept it either way.
    let parsed = match raw {
        Value::String(s) => serde_json::from_str::<PreferenceUpdate>(&s),
        Value::Object(_) => serde_json::from_value::<PreferenceUpdate>(raw),
        _ => return Err(err(&req.id, "bad_params", "missing preferences", None)),
    };
    parsed.map_err(|e| err(&req.id, "bad_params", format!("invalid preferences: {e}"), None))
}

fn handle_update_preferences(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let course_id = match param_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let user_id = match param_i64(req, "userId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let update = match parse_preferences(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let host = SqliteHost::new(conn);
    let (config, course) = match load_course(&host, req, course_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let engine = EligibilityEngine::new(&config, Utc::now());
    let outcome = update_auto_freezing_preferences(&host, &engine, &course, user_id, &update);
    ok(&req.id, json!(outcome))
}

fn handle_unfreeze_course(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let course_id = match param_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let user_id = match param_i64(req, "userId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let host = SqliteHost::new(conn);

    match actuator::unfreeze(&host, course_id, user_id) {
        Ok(()) => ok(&req.id, json!({ "success": true, "message": MSG_UNFROZEN })),
        Err(e) => {
            warn!(course_id, user_id, error = %e, "unfreeze rejected");
            ok(&req.id, json!({ "success": false, "message": e.to_string() }))
        }
    }
}

fn handle_course_info(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let course_id = match param_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let user_id = match param_i64(req, "userId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let host = SqliteHost::new(conn);
    let (config, course) = match load_course(&host, req, course_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let info = (|| -> crate::error::Result<Value> {
        let context = host
            .course_context(course_id)?
            .ok_or(LifecycleError::ContextNotFound(course_id))?;
        if !host.has_capability(user_id, CAP_VIEW, context.id)? {
            return Err(LifecycleError::PermissionDenied {
                capability: CAP_VIEW.to_string(),
            });
        }
        let read_only = context.locked || host.locked_ancestor(context.id)?.is_some();
        let preference = host.get_preference(course_id)?;
        let engine = EligibilityEngine::new(&config, Utc::now());
        let eligible = engine
            .is_eligible_for_auto_freeze(&course, preference.as_ref())
            .is_eligible();

        Ok(json!({
            "courseId": course.id,
            "fullname": course.fullname,
            "startDate": ymd(course.startdate),
            "endDate": course.end_date().and_then(ymd),
            "academicYear": course.academic_year(),
            "readOnly": read_only,
            "eligibleForAutoFreeze": eligible,
            "preferences": preference.map(|p| json!({
                "freezeexcluded": p.freezeexcluded,
                "freezedate": p.freezedate.and_then(ymd),
            })),
            "canOverride": host.has_capability(user_id, CAP_OVERRIDE, context.id)?,
            "canUnfreeze": host.has_capability(user_id, CAP_UNFREEZE, context.id)?,
        }))
    })();

    match info {
        Ok(v) => ok(&req.id, v),
        Err(e) => lifecycle_err(&req.id, &e),
    }
}

fn handle_eligible_courses(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let host = SqliteHost::new(conn);

    let listed = LifecycleConfig::load(&host).and_then(|config| {
        let year_field = academic_year_field_id(&host, &config)?;
        EligibilityEngine::new(&config, Utc::now()).list_courses_eligible_now(&host, year_field)
    });
    match listed {
        Ok(courses) => {
            let rows: Vec<Value> = courses
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "fullname": c.fullname,
                        "shortname": c.shortname,
                        "endDate": ymd(c.enddate),
                        "academicYear": c.academic_year(),
                    })
                })
                .collect();
            ok(&req.id, json!({ "courses": rows }))
        }
        Err(e) => lifecycle_err(&req.id, &e),
    }
}

fn handle_freeze_context_task(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let host = SqliteHost::new(conn);
    match run_freeze_context_task(&host, Utc::now()) {
        Ok(report) => ok(&req.id, json!(report)),
        Err(e) => lifecycle_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "lifecycle.getScheduledFreezeDate" => Some(handle_get_scheduled_freeze_date(state, req)),
        "lifecycle.updateAutoFreezingPreferences" => Some(handle_update_preferences(state, req)),
        "lifecycle.unfreezeCourse" => Some(handle_unfreeze_course(state, req)),
        "lifecycle.courseInfo" => Some(handle_course_info(state, req)),
        "lifecycle.eligibleCourses" => Some(handle_eligible_courses(state, req)),
        "task.freezeContext" => Some(handle_freeze_context_task(state, req)),
        _ => None,
    }
}
