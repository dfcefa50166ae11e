//! Tests for `/init` and `/disconnect`.

use axum::extract::State;
use axum::http::StatusCode;
use rrbridge_api::handlers::sessions::{disconnect_handler, init_handler};
use rrbridge_api::handlers::JsonBody;
use rrbridge_api::models::{DisconnectRequest, InitRequest};
use rrbridge_testing::{sample_credentials_json, unique_user_id};
use serde_json::json;

use crate::common::create_test_server_state;

fn init_body(user_id: Option<&str>, rriot: Option<serde_json::Value>) -> InitRequest {
    InitRequest {
        user_id: user_id.map(str::to_string),
        rriot,
    }
}

#[tokio::test]
async fn test_init_success() {
    let (state, connector) = create_test_server_state();
    let user = unique_user_id();

    let resp = init_handler(
        State(state.clone()),
        JsonBody(init_body(Some(&user), Some(sample_credentials_json(&user)))),
    )
    .await;

    assert!(resp.success);
    assert_eq!(resp.status_code(), StatusCode::OK);
    assert!(resp.error.is_none());
    assert_eq!(connector.connect_count(), 1);
    assert!(state.service.registry().get(&user).is_some());
}

#[tokio::test]
async fn test_init_missing_fields() {
    let (state, connector) = create_test_server_state();

    let resp = init_handler(State(state.clone()), JsonBody(init_body(Some("u1"), None))).await;
    assert!(!resp.success);
    assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.error.as_deref(), Some("Missing user_id or rriot"));

    let resp = init_handler(
        State(state.clone()),
        JsonBody(init_body(Some(""), Some(sample_credentials_json("a")))),
    )
    .await;
    assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);

    let resp = init_handler(State(state), JsonBody(init_body(Some("u1"), Some(json!({}))))).await;
    assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);

    assert_eq!(connector.call_count(), 0);
}

#[tokio::test]
async fn test_init_incomplete_credentials() {
    let (state, connector) = create_test_server_state();
    let mut rriot = sample_credentials_json("acct");
    rriot.as_object_mut().unwrap().remove("k");

    let resp = init_handler(State(state), JsonBody(init_body(Some("u1"), Some(rriot)))).await;

    assert!(!resp.success);
    assert_eq!(resp.status_code(), StatusCode::OK);
    assert!(resp.error.unwrap().contains("'k'"));
    assert_eq!(connector.connect_count(), 0);
}

#[tokio::test]
async fn test_init_connect_failure_is_reported() {
    let (state, connector) = create_test_server_state();
    connector.set_fail_connect(true);
    let user = unique_user_id();

    let resp = init_handler(
        State(state),
        JsonBody(init_body(Some(&user), Some(sample_credentials_json(&user)))),
    )
    .await;

    assert!(!resp.success);
    assert!(resp.error.unwrap().contains("simulated broker unreachable"));
}

#[tokio::test]
async fn test_init_accepts_credentials_alias() {
    let body: InitRequest = serde_json::from_value(json!({
        "user_id": "u1",
        "credentials": sample_credentials_json("acct"),
    }))
    .unwrap();
    assert!(body.rriot.is_some());
}

#[tokio::test]
async fn test_disconnect() {
    let (state, connector) = create_test_server_state();
    let user = unique_user_id();
    init_handler(
        State(state.clone()),
        JsonBody(init_body(Some(&user), Some(sample_credentials_json(&user)))),
    )
    .await;

    let resp = disconnect_handler(
        State(state.clone()),
        JsonBody(DisconnectRequest {
            user_id: Some(user.clone()),
        }),
    )
    .await;
    assert!(resp.success);
    assert!(state.service.registry().is_empty());
    assert_eq!(connector.close_count(), 1);

    // Unknown user: still a success, nothing closed
    let resp = disconnect_handler(
        State(state),
        JsonBody(DisconnectRequest {
            user_id: Some(user),
        }),
    )
    .await;
    assert!(resp.success);
    assert_eq!(connector.close_count(), 1);
}

#[tokio::test]
async fn test_disconnect_missing_user() {
    let (state, _) = create_test_server_state();
    let resp = disconnect_handler(State(state), JsonBody(DisconnectRequest::default())).await;
    assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.error.as_deref(), Some("Missing user_id"));
}
