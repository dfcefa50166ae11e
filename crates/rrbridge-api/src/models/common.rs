//! Response envelope shared by every mutating endpoint.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rrbridge_devices::{BridgeError, Outcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error text reported when a device does not answer in time.
pub const COMMAND_TIMEOUT: &str = "Command timeout";

/// `{success, result?, error?}` envelope.
///
/// # Examples
///
/// ```json
/// { "success": true, "result": [{"state": 8}] }
/// { "success": false, "error": "Command timeout" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// HTTP status; not part of the body
    #[serde(skip)]
    status: Option<StatusCode>,
}

impl BridgeResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            result: None,
            error: None,
            status: None,
        }
    }

    pub fn with_result(result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::ok()
        }
    }

    /// A failure reported with HTTP 200, as core failures are.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            status: None,
        }
    }

    /// Input rejected before the core ran.
    pub fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: Some(StatusCode::BAD_REQUEST),
            ..Self::failure(error)
        }
    }

    pub fn from_outcome(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success(result) => Self::with_result(result),
            Outcome::DeviceError(message) => Self::failure(message),
            Outcome::Timeout => Self::failure(COMMAND_TIMEOUT),
            Outcome::TransportFailure(message) => Self::failure(message),
        }
    }

    pub fn from_error(error: &BridgeError) -> Self {
        Self::failure(error.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }
}

impl IntoResponse for BridgeResponse {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_sessions: usize,
    pub users: Vec<String>,
    pub pending_requests: usize,
    pub version: String,
    /// Seconds since the server started
    pub uptime: u64,
}
