//! Tests for the health handler.

use axum::extract::State;
use rrbridge_api::handlers::basic::health_handler;
use rrbridge_testing::{sample_credentials, unique_user_id};

use crate::common::create_test_server_state;

#[tokio::test]
async fn test_health_with_no_sessions() {
    let (state, _) = create_test_server_state();
    let health = health_handler(State(state)).await.0;

    assert_eq!(health.status, "ok");
    assert_eq!(health.active_sessions, 0);
    assert!(health.users.is_empty());
    assert_eq!(health.pending_requests, 0);
    assert!(!health.version.is_empty());
}

#[tokio::test]
async fn test_health_lists_users() {
    let (state, _) = create_test_server_state();
    let user = unique_user_id();
    state
        .service
        .initialize(&user, sample_credentials(&user))
        .await
        .unwrap();

    let health = health_handler(State(state)).await.0;
    assert_eq!(health.active_sessions, 1);
    assert_eq!(health.users, vec![user]);
}
