//! Requests through the full router, covering extraction and status codes.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use rrbridge_api::create_router;
use rrbridge_testing::{sample_credentials_json, unique_user_id};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::common::create_test_server_state;

async fn send(router: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_invalid_json_is_bad_request() {
    let (state, _) = create_test_server_state();
    let router = create_router(state);

    for uri in ["/init", "/command", "/disconnect"] {
        let (status, body) = send(router.clone(), post_json(uri, "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body, json!({"success": false, "error": "Invalid JSON"}));
    }
}

#[tokio::test]
async fn test_init_then_health_over_http() {
    let (state, _) = create_test_server_state();
    let router = create_router(state);
    let user = unique_user_id();

    let init = json!({"user_id": user, "rriot": sample_credentials_json(&user)});
    let (status, body) = send(router.clone(), post_json("/init", &init.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_sessions"], 1);
    assert_eq!(body["users"], json!([user]));
}

#[tokio::test]
async fn test_missing_fields_over_http() {
    let (state, _) = create_test_server_state();
    let router = create_router(state);

    let (status, body) = send(router, post_json("/command", r#"{"user_id":"u1"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"success": false, "error": "Missing required fields"}));
}

#[tokio::test]
async fn test_body_without_content_type_is_accepted() {
    let (state, connector) = create_test_server_state();
    let router = create_router(state);
    let user = unique_user_id();

    let init = json!({"user_id": user, "rriot": sample_credentials_json(&user)});
    let request = Request::builder()
        .method("POST")
        .uri("/init")
        .body(Body::from(init.to_string()))
        .unwrap();
    let (status, body) = send(router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));
    assert_eq!(connector.connect_count(), 1);
}

#[tokio::test]
async fn test_numeric_user_id_is_accepted() {
    let (state, _) = create_test_server_state();
    let router = create_router(state);

    let (status, body) = send(router, post_json("/disconnect", r#"{"user_id":42}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));
}

#[tokio::test]
async fn test_non_object_body_is_bad_request() {
    let (state, _) = create_test_server_state();
    let router = create_router(state);

    let (status, body) = send(router, post_json("/init", r#"["u1", {}]"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"success": false, "error": "Invalid JSON"}));
}
