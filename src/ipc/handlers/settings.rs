use crate::academic::{current_academic_year, potential_academic_years};
use crate::config::{settings_catalogue, validate_setting, LifecycleConfig, CLC_FIELD};
use crate::host::{ConfigStore, CourseCatalog, PLUGIN};
use crate::ipc::error::{err, lifecycle_err, ok};
use crate::ipc::helpers::{param_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteHost;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

fn handle_settings_get(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let host = SqliteHost::new(conn);

    let loaded = host.plugin_config(PLUGIN).and_then(|stored| {
        let config = LifecycleConfig::from_entries(&stored);
        let fields = host.clc_text_fields()?;
        let years = potential_academic_years(&host, &config)?;
        Ok(settings_catalogue(&stored, &fields, &years))
    });
    match loaded {
        Ok(settings) => ok(&req.id, json!({ "settings": settings })),
        Err(e) => lifecycle_err(&req.id, &e),
    }
}

fn setting_value(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let name = match param_str(req, "name") {
        Ok(v) => v.trim(),
        Err(resp) => return resp,
    };
    let Some(raw) = setting_value(req.params.get("value")) else {
        return err(&req.id, "bad_params", "missing value", None);
    };
    let value = match validate_setting(name, &raw) {
        Ok(v) => v,
        Err(message) => {
            return err(
                &req.id,
                "bad_params",
                message,
                Some(json!({ "name": name })),
            )
        }
    };
    let host = SqliteHost::new(conn);

    if name == CLC_FIELD && !value.is_empty() {
        match host.clc_text_fields() {
            Ok(fields) if fields.iter().any(|f| f.id.to_string() == value) => {}
            Ok(_) => {
                return err(
                    &req.id,
                    "bad_params",
                    "clcfield must be a CLC text field",
                    Some(json!({ "name": name })),
                )
            }
            Err(e) => return lifecycle_err(&req.id, &e),
        }
    }

    let previous = match host.get_config(PLUGIN, name) {
        Ok(v) => v,
        Err(e) => return lifecycle_err(&req.id, &e),
    };
    if let Err(e) = host.set_config(PLUGIN, name, &value) {
        return lifecycle_err(&req.id, &e);
    }
    info!(name, previous = ?previous, value = %value, "setting updated");
    ok(&req.id, json!({ "name": name, "value": value }))
}

fn handle_potential_years(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let host = SqliteHost::new(conn);

    let loaded = LifecycleConfig::load(&host).and_then(|config| {
        let years = potential_academic_years(&host, &config)?;
        Ok((config, years))
    });
    match loaded {
        Ok((config, years)) => ok(
            &req.id,
            json!({
                "years": years,
                "currentYear": current_academic_year(Utc::now(), &config),
                "academicYearStartDate": config.academic_year_start.to_string(),
            }),
        ),
        Err(e) => lifecycle_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.update" => Some(handle_settings_update(state, req)),
        "academic.potentialYears" => Some(handle_potential_years(state, req)),
        _ => None,
    }
}
