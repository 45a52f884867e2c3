//! CLI integration tests using `assert_cmd`.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn aqo_cmd(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("aqo").unwrap();
    cmd.arg("--data-dir").arg(data_dir.path());
    cmd
}

#[test]
fn help_displays_usage() {
    Command::cargo_bin("aqo")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Operator CLI"))
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn version_displays_version() {
    Command::cargo_bin("aqo").unwrap().arg("--version").assert().success().stdout(predicate::str::contains("aqo"));
}

#[test]
fn invalid_command_shows_error() {
    Command::cargo_bin("aqo").unwrap().arg("invalid-command-xyz").assert().failure();
}

#[test]
fn config_dumps_defaults() {
    let dir = TempDir::new().unwrap();
    aqo_cmd(&dir).arg("config").assert().success().stdout(predicate::str::contains("[store]"));
}

#[test]
fn fresh_store_has_no_stat_rows() {
    let dir = TempDir::new().unwrap();
    aqo_cmd(&dir).arg("stat").assert().success().stdout(predicate::str::contains("No rows"));
}

#[test]
fn queries_lists_common_feature_space() {
    let dir = TempDir::new().unwrap();
    aqo_cmd(&dir).arg("queries").assert().success().stdout(predicate::str::contains("fs"));
}

#[test]
fn demo_then_data_reports_one_entry() {
    let dir = TempDir::new().unwrap();
    aqo_cmd(&dir).arg("demo").arg("7").arg("--actual-rows").arg("50.0").assert().success();

    aqo_cmd(&dir).arg("data").arg("--format").arg("json").assert().success().stdout(predicate::str::contains("\"fs\": 7"));
}

#[test]
fn set_preferences_then_drop_class() {
    let dir = TempDir::new().unwrap();
    aqo_cmd(&dir)
        .arg("set-preferences")
        .arg("42")
        .arg("--learn")
        .arg("false")
        .arg("--use-predictor")
        .arg("true")
        .assert()
        .success()
        .stdout(predicate::str::contains("OK"));

    aqo_cmd(&dir)
        .arg("queries")
        .arg("--format")
        .arg("json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"fs\": 42"));

    aqo_cmd(&dir).arg("drop-class").arg("42").assert().success().stdout(predicate::str::contains("OK"));
}

#[test]
fn reset_clears_data_table() {
    let dir = TempDir::new().unwrap();
    aqo_cmd(&dir).arg("demo").arg("3").arg("--actual-rows").arg("10.0").assert().success();
    aqo_cmd(&dir).arg("reset").assert().success();
    aqo_cmd(&dir).arg("data").assert().success().stdout(predicate::str::contains("No rows"));
}

#[test]
fn heap_reports_zero_on_fresh_store() {
    let dir = TempDir::new().unwrap();
    aqo_cmd(&dir).arg("heap").arg("--format").arg("json").assert().success().stdout(predicate::str::contains("\"used_bytes\": 0"));
}

#[test]
fn snapshot_persists_across_invocations() {
    let dir = TempDir::new().unwrap();
    aqo_cmd(&dir).arg("demo").arg("9").arg("--actual-rows").arg("5.0").assert().success();

    aqo_cmd(&dir).arg("stat").arg("--format").arg("json").assert().success().stdout(predicate::str::contains("\"fs\": 9"));
}
