//! Configuration loading: error messages, file formats, job translation.

use assert_fs::prelude::*;
use rstest::rstest;
use sheetsync_core::{config, ConfigError, Priority};

const VALID_JSON: &str = r#"{
  "SAMPLE_SPREADSHEET_ID": "sheet-1",
  "NOTION_INTEGRATION_TOKEN": "secret",
  "SETTLE_DELAY_MS": 250,
  "SYNC_PAIRS": [
    { "RANGE": "Tasks!A:E", "DATABASE_ID": "db-tasks", "PRIORITY": "grid" },
    { "RANGE": "Budget!A:H", "DATABASE_ID": "db-budget", "PRIORITY": "calculator",
      "NAME": "budget", "REPEAT": true, "INTERVAL": "month", "REPEAT_MONTH": "11:59-31" }
  ]
}"#;

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn missing_file_message_names_the_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let err = config::load_at(&dir.path().join("config.json")).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }), "got: {err}");
    let msg = err.to_string();
    assert!(msg.contains("config.json"), "must contain file path, got: {msg}");
    assert!(msg.contains("Please create it"));
}

#[test]
fn corrupt_json_returns_parse_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.json");
    file.write_str("{ \"SYNC_PAIRS\": [ unclosed").expect("write");

    let err = config::load_at(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Json { .. }), "got: {err}");
    assert!(err.to_string().contains("not a valid JSON file"));
}

#[test]
fn missing_required_key_is_a_parse_error() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.json");
    file.write_str(r#"{"SYNC_PAIRS": []}"#).expect("write");

    let err = config::load_at(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Json { .. }), "got: {err}");
}

#[test]
fn empty_job_list_is_invalid() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.json");
    file.write_str(
        r#"{"SAMPLE_SPREADSHEET_ID":"s","NOTION_INTEGRATION_TOKEN":"t","SYNC_PAIRS":[]}"#,
    )
    .expect("write");

    let err = config::load_at(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Formats
// ---------------------------------------------------------------------------

#[test]
fn json_config_loads_jobs_in_order() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.json");
    file.write_str(VALID_JSON).expect("write");
    file.assert(predicates::path::exists());

    let cfg = config::load_at(file.path()).expect("load");
    assert_eq!(cfg.spreadsheet_id, "sheet-1");
    assert_eq!(cfg.settle_delay.as_millis(), 250);
    assert_eq!(cfg.jobs.len(), 2);
    assert_eq!(cfg.jobs[0].display_name(), "Tasks!A:E");
    assert_eq!(cfg.jobs[1].display_name(), "budget");
    assert_eq!(cfg.jobs[1].priority, Priority::Calculator);
    let cadence = cfg.jobs[1].cadence.as_ref().expect("cadence");
    assert_eq!(cadence.value.as_deref(), Some("11:59-31"));
}

#[test]
fn yaml_config_is_read_by_extension() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("sheetsync.yaml");
    file.write_str(
        "SAMPLE_SPREADSHEET_ID: sheet-1\n\
         NOTION_INTEGRATION_TOKEN: secret\n\
         SYNC_PAIRS:\n\
         \x20 - RANGE: Tasks!A:E\n\
         \x20   DATABASE_ID: db-tasks\n\
         \x20   PRIORITY: notion\n\
         \x20   REPEAT: true\n\
         \x20   INTERVAL: day\n\
         \x20   REPEAT_DAY: \"18:01\"\n",
    )
    .expect("write");

    let cfg = config::load_at(file.path()).expect("load");
    assert_eq!(cfg.jobs[0].priority, Priority::RecordAuthoritative);
    assert_eq!(
        cfg.jobs[0].cadence.as_ref().and_then(|c| c.value.as_deref()),
        Some("18:01")
    );
}

#[test]
fn legacy_and_current_repeat_keys_load_together() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.json");
    file.write_str(
        r#"{"SAMPLE_SPREADSHEET_ID":"sheet-1","NOTION_INTEGRATION_TOKEN":"secret",
            "SYNC_PAIRS":[{"RANGE":"Tasks!A:E","DATABASE_ID":"db-tasks","PRIORITY":"grid",
              "REPEAT":true,"REAPEAT":false,"INTERVAL":"day","REPEAT_DAY":"18:01"}]}"#,
    )
    .expect("write");

    let cfg = config::load_at(file.path()).expect("load");
    let cadence = cfg.jobs[0].cadence.as_ref().expect("cadence");
    assert_eq!(cadence.interval.as_deref(), Some("day"));
    assert_eq!(cadence.value.as_deref(), Some("18:01"));
}

// ---------------------------------------------------------------------------
// 3. Priority spellings
// ---------------------------------------------------------------------------

#[rstest]
#[case("record", Priority::RecordAuthoritative)]
#[case("notion", Priority::RecordAuthoritative)]
#[case("grid", Priority::GridAuthoritative)]
#[case("sheet", Priority::GridAuthoritative)]
#[case("calculator", Priority::Calculator)]
fn priority_spellings(#[case] raw: &str, #[case] expected: Priority) {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.json");
    file.write_str(&format!(
        r#"{{"SAMPLE_SPREADSHEET_ID":"s","NOTION_INTEGRATION_TOKEN":"t",
            "SYNC_PAIRS":[{{"RANGE":"A!A:B","DATABASE_ID":"db","PRIORITY":"{raw}"}}]}}"#
    ))
    .expect("write");

    let cfg = config::load_at(file.path()).expect("load");
    assert_eq!(cfg.jobs[0].priority, expected);
}
