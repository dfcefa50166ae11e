//! Health check.

use axum::extract::State;
use axum::Json;

use super::ServerState;
use crate::models::HealthResponse;

/// `GET /health`
pub async fn health_handler(State(state): State<ServerState>) -> Json<HealthResponse> {
    let health = state.service.health();
    let uptime = chrono::Utc::now().timestamp() - state.started_at;

    Json(HealthResponse {
        status: "ok".to_string(),
        active_sessions: health.active_sessions,
        users: health.users,
        pending_requests: health.pending_requests,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: uptime.max(0) as u64,
    })
}
