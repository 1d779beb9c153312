//! CLI 端到端测试

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn scope_cli() -> Command {
    Command::cargo_bin("scope-cli").unwrap()
}

#[test]
fn test_help_lists_modes() {
    scope_cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("shell"))
        .stdout(predicate::str::contains("demo"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_config_show_defaults() {
    scope_cli()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[poller]"))
        .stdout(predicate::str::contains("period_ms = 10"))
        .stdout(predicate::str::contains("[telemetry]"));
}

#[test]
fn test_config_file_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scope.toml");
    fs::write(&path, "[telemetry]\nfps = 12\n").unwrap();

    scope_cli()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fps = 12"))
        .stdout(predicate::str::contains("period_ms = 10"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scope.toml");
    fs::write(&path, "[poller]\nperiod_ms = 0\n").unwrap();

    scope_cli()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .failure();
}

#[test]
fn test_config_init_refuses_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scope.toml");

    scope_cli()
        .args(["config", "init"])
        .arg(&path)
        .assert()
        .success();
    assert!(fs::read_to_string(&path).unwrap().contains("[motion]"));

    scope_cli()
        .args(["config", "init"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}
