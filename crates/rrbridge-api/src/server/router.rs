//! Route table.

use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::ServerState;
use crate::handlers::{basic, commands, lifecycle, sessions};

/// Largest accepted request body.
pub const MAX_REQUEST_BODY_SIZE: usize = 1024 * 1024;

pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(basic::health_handler))
        .route("/init", post(sessions::init_handler))
        .route("/disconnect", post(sessions::disconnect_handler))
        .route("/command", post(commands::command_handler))
        .route("/shutdown", post(lifecycle::shutdown_handler))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
