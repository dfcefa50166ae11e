//! Bridge error type.
//!
//! Timeouts and device-reported failures are not errors here; they come back
//! as [`crate::Outcome`] values because the caller still gets an answer.

use thiserror::Error;

use crate::protocol::CodecError;
use crate::transport::TransportError;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Error type for session and command operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No session registered for this user
    #[error("Session not initialized. Call /init first.")]
    NotInitialized { user_id: String },

    /// Credentials or configuration rejected before touching the network
    #[error("{0}")]
    Core(#[from] rrbridge_core::Error),

    /// Connect, subscribe or publish failed
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// Command could not be encoded
    #[error("Encoding failed: {0}")]
    Codec(#[from] CodecError),
}

impl BridgeError {
    pub fn not_initialized(user_id: impl Into<String>) -> Self {
        Self::NotInitialized {
            user_id: user_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_initialized_message() {
        let err = BridgeError::not_initialized("u1");
        assert_eq!(err.to_string(), "Session not initialized. Call /init first.");
    }

    #[test]
    fn test_transport_error_passthrough() {
        let err: BridgeError = TransportError::Connection("refused".into()).into();
        assert_eq!(err.to_string(), "Connection error: refused");
    }
}
