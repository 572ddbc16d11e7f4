mod test_support;

use rusqlite::Connection;
use serde_json::json;
use test_support::{
    create_course, db_path, midnight, request_ok, select_workspace_with_clc, set_setting,
    spawn_sidecar, temp_dir,
};

const TEACHER: i64 = 7;
const STUDENT: i64 = 8;

fn preference_rows(workspace: &std::path::Path, course_id: i64) -> Vec<(i64, i64)> {
    let conn = Connection::open(db_path(workspace)).expect("open db");
    let mut stmt = conn
        .prepare("SELECT freezeexcluded, freezedate FROM block_lifecycle WHERE courseid = ?")
        .expect("prepare");
    stmt.query_map([course_id], |r| Ok((r.get(0)?, r.get(1)?)))
        .expect("query")
        .collect::<Result<Vec<_>, _>>()
        .expect("rows")
}

#[test]
fn override_validation_and_upsert() {
    let workspace = temp_dir("lifecycle-preferences");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace_with_clc(&mut stdin, &mut reader, &workspace);
    set_setting(
        &mut stdin,
        &mut reader,
        "1",
        "late_summer_assessment_end_2020",
        "2021-11-30",
    );
    let (course_id, context_id) = create_course(
        &mut stdin,
        &mut reader,
        "2",
        None,
        "Ended 2021",
        "2021-06-30",
        Some("2020"),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "host.grantCapability",
        json!({
            "userId": TEACHER,
            "contextId": context_id,
            "capability": "block/lifecycle:overridecontextfreeze",
        }),
    );

    let denied = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "lifecycle.updateAutoFreezingPreferences",
        json!({
            "courseId": course_id,
            "userId": STUDENT,
            "preferences": { "togglefreeze": true, "delayfreezedate": "2099-06-01" },
        }),
    );
    assert_eq!(denied.get("success").and_then(|v| v.as_bool()), Some(false));
    assert!(preference_rows(&workspace, course_id).is_empty());

    let before_default = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "lifecycle.updateAutoFreezingPreferences",
        json!({
            "courseId": course_id,
            "userId": TEACHER,
            "preferences": { "togglefreeze": true, "delayfreezedate": "2021-11-30" },
        }),
    );
    assert_eq!(before_default.get("success").and_then(|v| v.as_bool()), Some(false));
    assert!(before_default
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .contains("(2021-11-30)"));

    let in_past = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "lifecycle.updateAutoFreezingPreferences",
        json!({
            "courseId": course_id,
            "userId": TEACHER,
            "preferences": { "togglefreeze": true, "delayfreezedate": "2021-12-01" },
        }),
    );
    assert_eq!(
        in_past.get("message").and_then(|v| v.as_str()),
        Some("The date for a Read-Only override must be in the future.")
    );
    assert!(preference_rows(&workspace, course_id).is_empty());

    // The form posts the payload JSON-encoded.
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "lifecycle.updateAutoFreezingPreferences",
        json!({
            "courseId": course_id,
            "userId": TEACHER,
            "preferences": r#"{"togglefreeze":true,"delayfreezedate":"2099-06-01"}"#,
        }),
    );
    assert_eq!(saved.get("success").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        saved.get("message").and_then(|v| v.as_str()),
        Some("Auto read only settings updated successfully.")
    );
    assert_eq!(
        preference_rows(&workspace, course_id),
        vec![(0, midnight(2099, 6, 1))]
    );

    let scheduled = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "lifecycle.getScheduledFreezeDate",
        json!({ "courseId": course_id }),
    );
    assert_eq!(
        scheduled.get("scheduledfreezedate").and_then(|v| v.as_str()),
        Some("01/06/2099")
    );
    assert_eq!(scheduled.get("source").and_then(|v| v.as_str()), Some("override"));
    let eligible = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "lifecycle.eligibleCourses",
        json!({}),
    );
    assert_eq!(
        eligible
            .get("courses")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    // Disabling drops the override and updates the same row.
    let disabled = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "lifecycle.updateAutoFreezingPreferences",
        json!({
            "courseId": course_id,
            "userId": TEACHER,
            "preferences": { "togglefreeze": false, "delayfreezedate": "2099-06-01" },
        }),
    );
    assert_eq!(disabled.get("success").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(preference_rows(&workspace, course_id), vec![(1, 0)]);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "host.grantCapability",
        json!({
            "userId": TEACHER,
            "contextId": context_id,
            "capability": "block/lifecycle:view",
        }),
    );
    let info = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "lifecycle.courseInfo",
        json!({ "courseId": course_id, "userId": TEACHER }),
    );
    assert_eq!(
        info.pointer("/preferences/freezeexcluded")
            .and_then(|v| v.as_bool()),
        Some(true)
    );
    assert_eq!(
        info.get("eligibleForAutoFreeze").and_then(|v| v.as_bool()),
        Some(false)
    );
}

#[test]
fn malformed_override_date_is_rejected() {
    let workspace = temp_dir("lifecycle-preferences-format");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace_with_clc(&mut stdin, &mut reader, &workspace);
    set_setting(
        &mut stdin,
        &mut reader,
        "1",
        "late_summer_assessment_end_2020",
        "2021-11-30",
    );
    let (course_id, _) = create_course(
        &mut stdin,
        &mut reader,
        "2",
        None,
        "Ended 2021",
        "2021-06-30",
        Some("2020"),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "host.grantCapability",
        json!({
            "userId": TEACHER,
            "contextId": 1,
            "capability": "block/lifecycle:overridecontextfreeze",
        }),
    );

    let bad = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "lifecycle.updateAutoFreezingPreferences",
        json!({
            "courseId": course_id,
            "userId": TEACHER,
            "preferences": { "togglefreeze": true, "delayfreezedate": "01/06/2099" },
        }),
    );
    assert_eq!(bad.get("success").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        bad.get("message").and_then(|v| v.as_str()),
        Some("Date must be in format YYYY-MM-DD")
    );
    assert!(preference_rows(&workspace, course_id).is_empty());
}
