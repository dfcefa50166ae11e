//! Tests for `/command`.

use axum::extract::State;
use axum::http::StatusCode;
use rrbridge_api::handlers::commands::command_handler;
use rrbridge_api::handlers::JsonBody;
use rrbridge_api::models::CommandRequestBody;
use rrbridge_api::ServerState;
use rrbridge_testing::{
    sample_credentials, unique_device_id, unique_user_id, SimulatedDevice, LOCAL_KEY,
};
use serde_json::json;

use crate::common::create_test_server_state;

fn command(user: &str, device: &str, command: &str) -> CommandRequestBody {
    CommandRequestBody {
        user_id: Some(user.to_string()),
        device_id: Some(device.to_string()),
        local_key: Some(LOCAL_KEY.to_string()),
        command: Some(command.to_string()),
        params: None,
    }
}

async fn with_user(state: &ServerState) -> String {
    let user = unique_user_id();
    state
        .service
        .initialize(&user, sample_credentials(&user))
        .await
        .unwrap();
    user
}

#[tokio::test]
async fn test_command_success() {
    let (state, connector) = create_test_server_state();
    let device = unique_device_id();
    connector.add_device(SimulatedDevice::replying(&device, LOCAL_KEY, json!(["ok"])));
    let user = with_user(&state).await;

    let mut body = command(&user, &device, "set_custom_mode");
    body.params = Some(json!([102]));
    let resp = command_handler(State(state), JsonBody(body)).await;

    assert!(resp.success);
    assert_eq!(resp.result, Some(json!(["ok"])));
    let received = connector.received_commands();
    assert_eq!(received[0].request.method, "set_custom_mode");
    assert_eq!(received[0].request.params, json!([102]));
}

#[tokio::test]
async fn test_command_timeout() {
    let (state, connector) = create_test_server_state();
    let device = unique_device_id();
    connector.add_device(SimulatedDevice::silent(&device, LOCAL_KEY));
    let user = with_user(&state).await;

    let resp = command_handler(State(state.clone()), JsonBody(command(&user, &device, "app_start"))).await;

    assert!(!resp.success);
    assert_eq!(resp.status_code(), StatusCode::OK);
    assert_eq!(resp.error.as_deref(), Some("Command timeout"));
    assert_eq!(state.service.health().pending_requests, 0);
}

#[tokio::test]
async fn test_command_device_error() {
    let (state, connector) = create_test_server_state();
    let device = unique_device_id();
    connector.add_device(SimulatedDevice::failing(&device, LOCAL_KEY, json!("unknown_method")));
    let user = with_user(&state).await;

    let resp = command_handler(State(state), JsonBody(command(&user, &device, "nope"))).await;

    assert!(!resp.success);
    assert_eq!(resp.error.as_deref(), Some("unknown_method"));
}

#[tokio::test]
async fn test_command_without_session() {
    let (state, connector) = create_test_server_state();

    let resp = command_handler(State(state), JsonBody(command("ghost", "dev1", "app_start"))).await;

    assert!(!resp.success);
    assert_eq!(resp.status_code(), StatusCode::OK);
    assert_eq!(
        resp.error.as_deref(),
        Some("Session not initialized. Call /init first.")
    );
    assert_eq!(connector.call_count(), 0);
}

#[tokio::test]
async fn test_command_missing_fields() {
    let (state, connector) = create_test_server_state();

    for field in ["user_id", "device_id", "local_key", "command"] {
        let mut body = command("u1", "dev1", "app_start");
        match field {
            "user_id" => body.user_id = None,
            "device_id" => body.device_id = None,
            "local_key" => body.local_key = Some(String::new()),
            _ => body.command = None,
        }
        let resp = command_handler(State(state.clone()), JsonBody(body)).await;
        assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST, "missing {field}");
        assert_eq!(resp.error.as_deref(), Some("Missing required fields"));
    }
    assert_eq!(connector.call_count(), 0);
}
