//! `POST /shutdown`

use axum::extract::State;

use super::ServerState;
use crate::models::BridgeResponse;

/// Close every session, then ask the server to stop.
pub async fn shutdown_handler(State(state): State<ServerState>) -> BridgeResponse {
    let closed = state.service.shutdown().await;
    tracing::info!("Shutdown requested, {} session(s) closed", closed);
    state.request_shutdown();
    BridgeResponse::ok()
}
