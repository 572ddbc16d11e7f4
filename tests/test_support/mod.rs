#![allow(dead_code)]

use chrono::{Days, NaiveDate, Utc};
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn db_path(workspace: &Path) -> PathBuf {
    workspace.join("lifecycle.sqlite3")
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_lifecycled");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn lifecycled");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Selects `workspace` and creates the CLC custom-field category with a
/// `course_year` text field. Returns the field id.
pub fn select_workspace_with_clc(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
) -> i64 {
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let category = request_ok(
        stdin,
        reader,
        "clc-cat",
        "host.createCustomFieldCategory",
        json!({ "name": "CLC" }),
    );
    let field = request_ok(
        stdin,
        reader,
        "clc-field",
        "host.createCustomField",
        json!({
            "categoryId": category.get("categoryId").and_then(|v| v.as_i64()).expect("categoryId"),
            "shortname": "course_year",
            "name": "Academic year",
        }),
    );
    field.get("fieldId").and_then(|v| v.as_i64()).expect("fieldId")
}

/// Creates a course and returns `(course_id, context_id)`.
pub fn create_course(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    category_id: Option<i64>,
    fullname: &str,
    end_date: &str,
    academic_year: Option<&str>,
) -> (i64, i64) {
    let mut params = json!({
        "fullname": fullname,
        "startDate": "2020-09-01",
        "endDate": end_date,
    });
    if let Some(c) = category_id {
        params["categoryId"] = json!(c);
    }
    if let Some(y) = academic_year {
        params["customFields"] = json!({ "course_year": y });
    }
    let created = request_ok(stdin, reader, id, "host.createCourse", params);
    (
        created.get("courseId").and_then(|v| v.as_i64()).expect("courseId"),
        created.get("contextId").and_then(|v| v.as_i64()).expect("contextId"),
    )
}

pub fn set_setting(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    name: &str,
    value: &str,
) {
    let _ = request_ok(
        stdin,
        reader,
        id,
        "settings.update",
        json!({ "name": name, "value": value }),
    );
}

/// Unix timestamp of UTC midnight on the given date.
pub fn midnight(y: i32, m: u32, d: u32) -> i64 {
    NaiveDate::from_ymd_opt(y, m, d)
        .expect("date")
        .and_hms_opt(0, 0, 0)
        .expect("time")
        .and_utc()
        .timestamp()
}

/// Tomorrow as the sidecar displays it (`dd/mm/YYYY`).
pub fn tomorrow_display() -> String {
    Utc::now()
        .date_naive()
        .checked_add_days(Days::new(1))
        .expect("tomorrow")
        .format("%d/%m/%Y")
        .to_string()
}

pub fn result_str<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str())
}
