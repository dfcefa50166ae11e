//! Session handlers: `/init` and `/disconnect`.

use axum::extract::State;
use rrbridge_core::RriotCredentials;

use super::{JsonBody, ServerState};
use crate::models::requests::{present, truthy};
use crate::models::{BridgeResponse, DisconnectRequest, InitRequest};

/// `POST /init`: open (or reopen) the user's device connection.
pub async fn init_handler(
    State(state): State<ServerState>,
    JsonBody(body): JsonBody<InitRequest>,
) -> BridgeResponse {
    let (Some(user_id), Some(rriot)) = (present(&body.user_id), truthy(&body.rriot)) else {
        return BridgeResponse::bad_request("Missing user_id or rriot");
    };

    let credentials = match RriotCredentials::from_value(rriot) {
        Ok(credentials) => credentials,
        Err(e) => {
            tracing::error!(user_id, "Failed to initialize session: {}", e);
            return BridgeResponse::failure(e.to_string());
        }
    };

    match state.service.initialize(user_id, credentials).await {
        Ok(()) => BridgeResponse::ok(),
        Err(e) => {
            tracing::error!(user_id, "Failed to initialize session: {}", e);
            BridgeResponse::from_error(&e)
        }
    }
}

/// `POST /disconnect`: close the user's session. Unknown users succeed too.
pub async fn disconnect_handler(
    State(state): State<ServerState>,
    JsonBody(body): JsonBody<DisconnectRequest>,
) -> BridgeResponse {
    let Some(user_id) = present(&body.user_id) else {
        return BridgeResponse::bad_request("Missing user_id");
    };

    state.service.disconnect(user_id).await;
    BridgeResponse::ok()
}
