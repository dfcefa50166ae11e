//! One-shot bridge: one JSON request on stdin, one JSON object on stdout.
//!
//! Input problems print `{"error": ...}` and exit 1. Once the request reached
//! the bridge the envelope is printed and the exit code is 0, even when the
//! device failed or never answered.

use std::io::Read;
use std::process::ExitCode;

use anyhow::Result;
use rrbridge_api::models::BridgeResponse;
use rrbridge_core::{BridgeConfig, RriotCredentials};
use rrbridge_devices::{BridgeService, Outcome, GET_STATUS};
use serde_json::{json, Value};

/// User id of the throwaway session.
const ONE_SHOT_USER: &str = "one-shot";

#[derive(Debug, Clone, PartialEq)]
enum Action {
    Command {
        command: String,
        params: Option<Value>,
    },
    GetStatus,
}

#[derive(Debug, Clone)]
struct OneShotRequest {
    credentials: RriotCredentials,
    device_id: String,
    local_key: String,
    action: Action,
}

pub async fn run(action: Option<&str>, config: &BridgeConfig) -> Result<ExitCode> {
    let Some(action) = action else {
        return Ok(usage_error("Usage: rrbridge bridge <action>"));
    };

    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;

    let request = match parse_request(action, &input) {
        Ok(request) => request,
        Err(message) => return Ok(usage_error(message)),
    };

    let service = crate::build_service(config);
    let output = execute(&service, request).await;
    service.shutdown().await;

    println!("{output}");
    Ok(ExitCode::SUCCESS)
}

fn usage_error(message: impl Into<String>) -> ExitCode {
    let message: String = message.into();
    println!("{}", json!({ "error": message }));
    ExitCode::FAILURE
}

/// Validate the input in the order callers have always seen errors reported.
fn parse_request(action: &str, input: &str) -> Result<OneShotRequest, String> {
    let input: Value =
        serde_json::from_str(input).map_err(|e| format!("Invalid JSON input: {e}"))?;

    let rriot = input
        .get("rriot")
        .ok_or_else(|| "Missing 'rriot' in input".to_string())?;
    let credentials = RriotCredentials::from_value(rriot).map_err(|e| {
        match RriotCredentials::missing_field(rriot) {
            Some(field) => format!("Missing rriot field: '{field}'"),
            None => format!("Failed to create rriot: {e}"),
        }
    })?;

    let action = match action {
        "command" | "get_status" => action,
        other => return Err(format!("Unknown action: {other}")),
    };
    let device_id = string_field(&input, "device_id")
        .ok_or_else(|| format!("Missing 'device_id' for {action}"))?;
    let local_key = string_field(&input, "local_key")
        .ok_or_else(|| format!("Missing 'local_key' for {action}"))?;

    let action = if action == "command" {
        let command = string_field(&input, "command")
            .ok_or_else(|| "Missing 'command' for command action".to_string())?;
        let params = input.get("params").filter(|p| !p.is_null()).cloned();
        Action::Command { command, params }
    } else {
        Action::GetStatus
    };

    Ok(OneShotRequest {
        credentials,
        device_id,
        local_key,
        action,
    })
}

fn string_field(input: &Value, key: &str) -> Option<String> {
    input.get(key).and_then(Value::as_str).map(str::to_string)
}

async fn execute(service: &BridgeService, request: OneShotRequest) -> Value {
    if let Err(e) = service.initialize(ONE_SHOT_USER, request.credentials).await {
        return envelope(BridgeResponse::from_error(&e));
    }

    let outcome = match request.action {
        Action::Command { command, params } => {
            service
                .send_command(
                    ONE_SHOT_USER,
                    &request.device_id,
                    &request.local_key,
                    &command,
                    params,
                )
                .await
        }
        Action::GetStatus => {
            // Raw reply: emptiness is judged before the list is unwrapped.
            return match service
                .send_command_with_timeout(
                    ONE_SHOT_USER,
                    &request.device_id,
                    &request.local_key,
                    GET_STATUS,
                    None,
                    service.status_timeout(),
                )
                .await
            {
                Ok(outcome) => status_output(outcome),
                Err(e) => envelope(BridgeResponse::from_error(&e)),
            };
        }
    };

    match outcome {
        Ok(outcome) => envelope(BridgeResponse::from_outcome(outcome)),
        Err(e) => envelope(BridgeResponse::from_error(&e)),
    }
}

/// `{"success": true, "status": ...}` for a non-empty status reply, with a
/// list reply unwrapped to its first element. Anything else is the plain
/// envelope.
fn status_output(outcome: Outcome) -> Value {
    match outcome {
        Outcome::Success(raw) if !is_empty(&raw) => {
            let status = match raw {
                Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
                other => other,
            };
            json!({ "success": true, "status": status })
        }
        outcome => envelope(BridgeResponse::from_outcome(outcome)),
    }
}

fn envelope(response: BridgeResponse) -> Value {
    serde_json::to_value(response)
        .unwrap_or_else(|e| json!({ "success": false, "error": e.to_string() }))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rriot() -> Value {
        json!({
            "u": "user-1",
            "s": "secret",
            "h": "hmac",
            "k": "key",
            "r": {"a": "https://api.example.com", "m": "ssl://mqtt.example.com:8883"}
        })
    }

    fn parse_err(action: &str, input: Value) -> String {
        parse_request(action, &input.to_string()).unwrap_err()
    }

    #[test]
    fn test_invalid_json() {
        let err = parse_request("command", "{not json").unwrap_err();
        assert!(err.starts_with("Invalid JSON input: "));
    }

    #[test]
    fn test_missing_rriot() {
        assert_eq!(
            parse_err("command", json!({"device_id": "d"})),
            "Missing 'rriot' in input"
        );
    }

    #[test]
    fn test_missing_rriot_field() {
        let mut creds = rriot();
        creds.as_object_mut().unwrap().remove("k");
        assert_eq!(
            parse_err("command", json!({"rriot": creds})),
            "Missing rriot field: 'k'"
        );
    }

    #[test]
    fn test_rriot_without_broker_url() {
        let mut creds = rriot();
        creds["r"].as_object_mut().unwrap().remove("m");
        let err = parse_err("get_status", json!({"rriot": creds}));
        assert!(err.starts_with("Failed to create rriot: "), "{err}");
    }

    #[test]
    fn test_command_field_order() {
        assert_eq!(
            parse_err("command", json!({"rriot": rriot()})),
            "Missing 'device_id' for command"
        );
        assert_eq!(
            parse_err("command", json!({"rriot": rriot(), "device_id": "d"})),
            "Missing 'local_key' for command"
        );
        assert_eq!(
            parse_err(
                "command",
                json!({"rriot": rriot(), "device_id": "d", "local_key": "k"})
            ),
            "Missing 'command' for command action"
        );
    }

    #[test]
    fn test_get_status_field_order() {
        assert_eq!(
            parse_err("get_status", json!({"rriot": rriot()})),
            "Missing 'device_id' for get_status"
        );
        assert_eq!(
            parse_err("get_status", json!({"rriot": rriot(), "device_id": "d"})),
            "Missing 'local_key' for get_status"
        );
    }

    #[test]
    fn test_unknown_action() {
        assert_eq!(
            parse_err("dance", json!({"rriot": rriot()})),
            "Unknown action: dance"
        );
    }

    #[test]
    fn test_command_request() {
        let input = json!({
            "rriot": rriot(),
            "device_id": "d",
            "local_key": "k",
            "command": "app_start",
            "params": null
        });
        let request = parse_request("command", &input.to_string()).unwrap();
        assert_eq!(request.device_id, "d");
        assert_eq!(
            request.action,
            Action::Command {
                command: "app_start".to_string(),
                params: None
            }
        );
    }

    #[test]
    fn test_status_checks_raw_reply_before_unwrapping() {
        assert_eq!(
            status_output(Outcome::Success(json!([{}]))),
            json!({"success": true, "status": {}})
        );
        assert_eq!(
            status_output(Outcome::Success(json!([{"state": 8}, {"state": 5}]))),
            json!({"success": true, "status": {"state": 8}})
        );
        assert_eq!(
            status_output(Outcome::Success(json!({"state": 8}))),
            json!({"success": true, "status": {"state": 8}})
        );
        assert_eq!(
            status_output(Outcome::Success(json!([]))),
            json!({"success": true, "result": []})
        );
        assert_eq!(
            status_output(Outcome::Timeout),
            json!({"success": false, "error": "Command timeout"})
        );
    }

    #[test]
    fn test_empty_status_is_not_unwrapped() {
        assert!(is_empty(&json!([])));
        assert!(is_empty(&Value::Null));
        assert!(!is_empty(&json!({"state": 8})));
    }
}
