//! Binary behaviour that needs no network: configuration handling and job
//! listing.

use std::process::Command;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::str::contains;
use serde_json::Value;

const CONFIG: &str = r#"{
  "SAMPLE_SPREADSHEET_ID": "sheet-1",
  "NOTION_INTEGRATION_TOKEN": "secret",
  "SYNC_PAIRS": [
    { "RANGE": "Tasks!A:C", "DATABASE_ID": "db-tasks", "PRIORITY": "grid" },
    { "RANGE": "Budget!A:H", "DATABASE_ID": "db-budget", "PRIORITY": "calculator",
      "NAME": "budget", "REPEAT": true, "INTERVAL": "day", "REPEAT_DAY": "18:01" },
    { "RANGE": "Log!A:B", "DATABASE_ID": "db-log", "PRIORITY": "record",
      "NAME": "log", "REAPEAT": true, "INTERVAL": "week", "REPEAT_WEEK": "09:00-someday" }
  ]
}"#;

fn sheetsync(home: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("sheetsync"));
    cmd.env("HOME", home.path())
        .env("USERPROFILE", home.path())
        .env_remove("SHEETSYNC_CONFIG")
        .env_remove("GOOGLE_ACCESS_TOKEN")
        .current_dir(home.path());
    cmd
}

fn with_config(home: &TempDir) -> std::path::PathBuf {
    let file = home.child("config.json");
    file.write_str(CONFIG).expect("write config");
    file.path().to_path_buf()
}

#[test]
fn missing_config_is_reported_and_nothing_runs() {
    let home = TempDir::new().expect("home");

    sheetsync(&home)
        .arg("run")
        .assert()
        .failure()
        .stderr(contains("config.json not found"));

    home.child(".sheetsync").assert(predicates::path::missing());
}

#[test]
fn malformed_config_names_the_file() {
    let home = TempDir::new().expect("home");
    let file = home.child("broken.json");
    file.write_str("{ not json").expect("write");

    sheetsync(&home)
        .args(["--config", file.path().to_str().expect("utf8 path"), "jobs"])
        .assert()
        .failure()
        .stderr(contains("broken.json"))
        .stderr(contains("not a valid JSON file"));
}

#[test]
fn jobs_json_lists_schedules_and_unparsable_cadences() {
    let home = TempDir::new().expect("home");
    with_config(&home);

    let assert = sheetsync(&home).args(["jobs", "--json"]).assert().success();
    let jobs: Value = serde_json::from_slice(&assert.get_output().stdout).expect("json");
    let jobs = jobs.as_array().expect("array");

    assert_eq!(jobs.len(), 3);
    assert_eq!(jobs[0]["name"], "Tasks!A:C");
    assert_eq!(jobs[0]["schedule"], "once");
    assert_eq!(jobs[0]["repeating"], false);
    assert_eq!(jobs[1]["name"], "budget");
    assert_eq!(jobs[1]["priority"], "calculator");
    assert_eq!(jobs[1]["schedule"], "daily at 18:01");
    assert_eq!(jobs[2]["repeating"], true);
    assert_eq!(jobs[2]["schedule"], "never");
    assert!(jobs[2]["error"]
        .as_str()
        .expect("error text")
        .contains("someday"));
}

#[test]
fn jobs_table_flags_jobs_that_never_fire() {
    let home = TempDir::new().expect("home");
    let config = with_config(&home);

    sheetsync(&home)
        .args(["--config", config.to_str().expect("utf8 path"), "jobs"])
        .assert()
        .success()
        .stdout(contains("budget"))
        .stdout(contains("daily at 18:01"))
        .stdout(contains("never fires"));
}

#[test]
fn config_path_can_come_from_the_environment() {
    let home = TempDir::new().expect("home");
    let config = with_config(&home);
    let elsewhere = TempDir::new().expect("cwd");

    sheetsync(&home)
        .current_dir(elsewhere.path())
        .env("SHEETSYNC_CONFIG", &config)
        .args(["jobs", "--json"])
        .assert()
        .success()
        .stdout(contains("db-budget"));
}

#[test]
fn unknown_job_is_an_error() {
    let home = TempDir::new().expect("home");
    with_config(&home);

    sheetsync(&home)
        .args(["sync", "nope"])
        .assert()
        .failure()
        .stderr(contains("no job named 'nope'"));
}

#[test]
fn live_commands_need_a_grid_token() {
    let home = TempDir::new().expect("home");
    with_config(&home);

    sheetsync(&home)
        .args(["plan", "budget"])
        .assert()
        .failure()
        .stderr(contains("no Google access token"));
}
