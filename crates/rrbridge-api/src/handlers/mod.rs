//! Control surface handlers.

pub mod basic;
pub mod commands;
pub mod lifecycle;
pub mod sessions;

// Re-export ServerState so handlers can use it
pub use crate::server::ServerState;

pub use basic::health_handler;
pub use commands::command_handler;
pub use lifecycle::shutdown_handler;
pub use sessions::{disconnect_handler, init_handler};

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::models::BridgeResponse;

/// JSON object body, accepted whatever the `Content-Type` header says.
///
/// Anything that is not a JSON object is rejected with the 400
/// `Invalid JSON` envelope.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = BridgeResponse;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|rejection| {
            tracing::debug!("Rejected request body: {}", rejection);
            BridgeResponse::bad_request("Invalid JSON")
        })?;
        parse_body(&bytes).map(JsonBody)
    }
}

/// Parse a request body into `T`, requiring a JSON object.
pub fn parse_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, BridgeResponse> {
    let invalid = |e: serde_json::Error| {
        tracing::debug!("Rejected request body: {}", e);
        BridgeResponse::bad_request("Invalid JSON")
    };
    let value: Value = serde_json::from_slice(bytes).map_err(invalid)?;
    if !value.is_object() {
        return Err(BridgeResponse::bad_request("Invalid JSON"));
    }
    serde_json::from_value(value).map_err(invalid)
}
