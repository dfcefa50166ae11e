//! Tests for the `serve` command.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_serve_help_lists_overrides() {
    let mut cmd = Command::cargo_bin("rrbridge").unwrap();
    cmd.arg("serve").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--host"))
        .stdout(predicate::str::contains("--port"));
}

#[test]
fn test_serve_invalid_port_rejected() {
    let mut cmd = Command::cargo_bin("rrbridge").unwrap();
    cmd.arg("serve").arg("--port").arg("99999");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_serve_zero_port_rejected() {
    let mut cmd = Command::cargo_bin("rrbridge").unwrap();
    cmd.arg("serve").arg("--port").arg("0");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("port must be non-zero"));
}

#[test]
fn test_serve_bad_config_value_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rrbridge.toml");
    std::fs::write(&path, "command_timeout_secs = 0\n").unwrap();

    let mut cmd = Command::cargo_bin("rrbridge").unwrap();
    cmd.arg("--config").arg(&path).arg("serve");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("command_timeout_secs"));
}
