use crate::engine::timestamp_to_datetime;
use crate::host::{CourseCatalog, LockableScope};
use crate::ipc::error::{err, lifecycle_err, ok};
use crate::ipc::helpers::{param_i64, param_opt_i64, param_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::store::{NewCourse, SqliteHost};
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;

fn ymd(ts: i64) -> Option<String> {
    timestamp_to_datetime(ts).map(|d| d.format("%Y-%m-%d").to_string())
}

/// Unix seconds or `YYYY-MM-DD` (UTC midnight). Missing or empty means 0.
fn param_timestamp(req: &Request, key: &str) -> Result<i64, Value> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_i64()
            .filter(|ts| timestamp_to_datetime(*ts).is_some())
            .ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    format!("{key} must be a timestamp in the calendar range"),
                    None,
                )
            }),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(0),
        Some(Value::String(s)) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc().timestamp())
            .ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    format!("{key} must be YYYY-MM-DD"),
                    None,
                )
            }),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{key} must be a date or timestamp"),
            None,
        )),
    }
}

fn handle_create_category(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let name = match param_str(req, "name") {
        Ok(v) => v.trim(),
        Err(resp) => return resp,
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    let parent = match param_opt_i64(req, "parentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match SqliteHost::new(conn).create_category(name, parent) {
        Ok((category_id, context_id)) => ok(
            &req.id,
            json!({ "categoryId": category_id, "contextId": context_id }),
        ),
        Err(e) => lifecycle_err(&req.id, &e),
    }
}

fn handle_create_course(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let fullname = match param_str(req, "fullname") {
        Ok(v) => v.trim().to_string(),
        Err(resp) => return resp,
    };
    if fullname.is_empty() {
        return err(&req.id, "bad_params", "fullname must not be empty", None);
    }
    let shortname = req
        .params
        .get("shortname")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| fullname.clone());
    let category = match param_opt_i64(req, "categoryId") {
        Ok(v) => v.unwrap_or(0),
        Err(resp) => return resp,
    };
    let startdate = match param_timestamp(req, "startDate") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let enddate = match param_timestamp(req, "endDate") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut custom_fields = BTreeMap::new();
    if let Some(fields) = req.params.get("customFields") {
        let Some(map) = fields.as_object() else {
            return err(&req.id, "bad_params", "customFields must be an object", None);
        };
        for (k, v) in map {
            let value = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => {
                    return err(
                        &req.id,
                        "bad_params",
                        format!("customFields.{k} must be a string"),
                        None,
                    )
                }
            };
            custom_fields.insert(k.clone(), value);
        }
    }

    let course = NewCourse {
        category,
        fullname,
        shortname,
        startdate,
        enddate,
        custom_fields,
    };
    match SqliteHost::new(conn).create_course(&course) {
        Ok((course_id, context_id)) => {
            info!(course_id, fullname = %course.fullname, "course created");
            ok(
                &req.id,
                json!({ "courseId": course_id, "contextId": context_id }),
            )
        }
        Err(e) => lifecycle_err(&req.id, &e),
    }
}

fn handle_get_course(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let course_id = match param_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let host = SqliteHost::new(conn);

    let loaded = (|| -> crate::error::Result<Value> {
        let config = crate::config::LifecycleConfig::load(&host)?;
        let year_field = crate::academic::academic_year_field_id(&host, &config)?;
        let course = host
            .get_course(course_id, year_field)?
            .ok_or(crate::error::LifecycleError::CourseNotFound(course_id))?;
        let context = host.course_context(course_id)?;
        Ok(json!({
            "id": course.id,
            "category": course.category,
            "fullname": course.fullname,
            "shortname": course.shortname,
            "startDate": ymd(course.startdate),
            "endDate": course.end_date().and_then(ymd),
            "academicYear": course.academic_year(),
            "contextId": context.as_ref().map(|c| c.id),
            "locked": context.map(|c| c.locked).unwrap_or(false),
        }))
    })();
    match loaded {
        Ok(v) => ok(&req.id, v),
        Err(e) => lifecycle_err(&req.id, &e),
    }
}

fn handle_create_customfield_category(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let name = match param_str(req, "name") {
        Ok(v) => v.trim(),
        Err(resp) => return resp,
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    match SqliteHost::new(conn).create_customfield_category(name) {
        Ok(id) => ok(&req.id, json!({ "categoryId": id })),
        Err(e) => lifecycle_err(&req.id, &e),
    }
}

fn handle_create_customfield(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let category_id = match param_i64(req, "categoryId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let shortname = match param_str(req, "shortname") {
        Ok(v) => v.trim(),
        Err(resp) => return resp,
    };
    if shortname.is_empty() {
        return err(&req.id, "bad_params", "shortname must not be empty", None);
    }
    let name = req
        .params
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or(shortname);
    let field_type = req
        .params
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("text");

    match SqliteHost::new(conn).create_customfield(category_id, shortname, name, field_type) {
        Ok(id) => ok(&req.id, json!({ "fieldId": id })),
        Err(e) => lifecycle_err(&req.id, &e),
    }
}

fn handle_set_context_locked(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let context_id = match param_i64(req, "contextId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(locked) = req.params.get("locked").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "missing locked", None);
    };

    let host = SqliteHost::new(conn);
    let context = match host.context(context_id) {
        Ok(Some(c)) => c,
        Ok(None) => {
            return lifecycle_err(
                &req.id,
                &crate::error::LifecycleError::ContextNotFound(context_id),
            )
        }
        Err(e) => return lifecycle_err(&req.id, &e),
    };
    match host.set_locked(context_id, locked) {
        Ok(()) => {
            info!(context_id, locked, "context lock changed");
            ok(
                &req.id,
                json!({
                    "contextId": context.id,
                    "contextLevel": context.level.as_i64(),
                    "instanceId": context.instance_id,
                    "parentId": context.parent_id,
                    "locked": locked,
                }),
            )
        }
        Err(e) => lifecycle_err(&req.id, &e),
    }
}

fn handle_grant_capability(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match param_i64(req, "userId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let context_id = match param_i64(req, "contextId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let capability = match param_str(req, "capability") {
        Ok(v) => v.trim(),
        Err(resp) => return resp,
    };

    match SqliteHost::new(conn).grant_capability(user_id, context_id, capability) {
        Ok(()) => ok(&req.id, json!({ "granted": true })),
        Err(e) => lifecycle_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "host.createCategory" => Some(handle_create_category(state, req)),
        "host.createCourse" => Some(handle_create_course(state, req)),
        "host.getCourse" => Some(handle_get_course(state, req)),
        "host.createCustomFieldCategory" => Some(handle_create_customfield_category(state, req)),
        "host.createCustomField" => Some(handle_create_customfield(state, req)),
        "host.setContextLocked" => Some(handle_set_context_locked(state, req)),
        "host.grantCapability" => Some(handle_grant_capability(state, req)),
        _ => None,
    }
}
