//! Tests for the one-shot `bridge` command.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};

fn rriot(broker: &str) -> Value {
    json!({
        "u": "user-1",
        "s": "secret",
        "h": "hmac",
        "k": "key",
        "r": {"a": "https://api.example.com", "m": broker}
    })
}

fn bridge(action: &str, input: &str) -> assert_cmd::assert::Assert {
    let mut cmd = Command::cargo_bin("rrbridge").unwrap();
    cmd.arg("bridge").arg(action).write_stdin(input.to_string());
    cmd.assert()
}

#[test]
fn test_bridge_without_action() {
    let mut cmd = Command::cargo_bin("rrbridge").unwrap();
    cmd.arg("bridge").write_stdin("{}");

    cmd.assert()
        .code(1)
        .stdout(predicate::str::contains(r#"{"error":"Usage: rrbridge bridge <action>"}"#));
}

#[test]
fn test_bridge_invalid_json() {
    bridge("command", "{oops")
        .code(1)
        .stdout(predicate::str::contains("Invalid JSON input"));
}

#[test]
fn test_bridge_missing_rriot() {
    bridge("command", r#"{"device_id":"d"}"#)
        .code(1)
        .stdout(predicate::str::contains("Missing 'rriot' in input"));
}

#[test]
fn test_bridge_missing_rriot_field() {
    let mut creds = rriot("ssl://mqtt.example.com:8883");
    creds.as_object_mut().unwrap().remove("s");
    let input = json!({"rriot": creds, "device_id": "d", "local_key": "k"});

    bridge("get_status", &input.to_string())
        .code(1)
        .stdout(predicate::str::contains("Missing rriot field: 's'"));
}

#[test]
fn test_bridge_missing_command() {
    let input = json!({
        "rriot": rriot("ssl://mqtt.example.com:8883"),
        "device_id": "d",
        "local_key": "k"
    });

    bridge("command", &input.to_string())
        .code(1)
        .stdout(predicate::str::contains("Missing 'command' for command action"));
}

#[test]
fn test_bridge_unknown_action() {
    let input = json!({"rriot": rriot("ssl://mqtt.example.com:8883")});

    bridge("vacuum", &input.to_string())
        .code(1)
        .stdout(predicate::str::contains("Unknown action: vacuum"));
}

#[test]
fn test_bridge_unreachable_broker_reports_failure() {
    let input = json!({
        "rriot": rriot("tcp://127.0.0.1:1"),
        "device_id": "d",
        "local_key": "abcdefghijklmnop",
        "command": "app_start"
    });

    let output = bridge("command", &input.to_string())
        .success()
        .get_output()
        .stdout
        .clone();

    let body: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].is_string());
}
