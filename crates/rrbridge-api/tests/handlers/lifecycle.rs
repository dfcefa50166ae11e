//! Tests for `/shutdown`.

use axum::extract::State;
use rrbridge_api::handlers::basic::health_handler;
use rrbridge_api::handlers::lifecycle::shutdown_handler;
use rrbridge_testing::{sample_credentials, unique_user_id};

use crate::common::create_test_server_state;

#[tokio::test]
async fn test_shutdown_closes_sessions_and_signals_server() {
    let (state, connector) = create_test_server_state();
    for _ in 0..2 {
        let user = unique_user_id();
        state
            .service
            .initialize(&user, sample_credentials(&user))
            .await
            .unwrap();
    }
    assert!(!state.shutdown_requested());

    let resp = shutdown_handler(State(state.clone())).await;
    assert!(resp.success);
    assert!(state.shutdown_requested());
    assert_eq!(connector.close_count(), 2);

    // Returns immediately once requested
    tokio::time::timeout(std::time::Duration::from_secs(1), state.wait_for_shutdown())
        .await
        .unwrap();

    let health = health_handler(State(state)).await.0;
    assert_eq!(health.active_sessions, 0);
}
