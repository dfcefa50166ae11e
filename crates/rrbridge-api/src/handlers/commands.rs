//! `POST /command`

use axum::extract::State;

use super::{JsonBody, ServerState};
use crate::models::requests::present;
use crate::models::{BridgeResponse, CommandRequestBody};

/// Send one command to a device and wait for its reply.
pub async fn command_handler(
    State(state): State<ServerState>,
    JsonBody(body): JsonBody<CommandRequestBody>,
) -> BridgeResponse {
    let (Some(user_id), Some(device_id), Some(local_key), Some(command)) = (
        present(&body.user_id),
        present(&body.device_id),
        present(&body.local_key),
        present(&body.command),
    ) else {
        return BridgeResponse::bad_request("Missing required fields");
    };
    let params = body.params.clone().filter(|p| !p.is_null());

    match state
        .service
        .send_command(user_id, device_id, local_key, command, params)
        .await
    {
        Ok(outcome) => BridgeResponse::from_outcome(outcome),
        Err(e) => BridgeResponse::from_error(&e),
    }
}

