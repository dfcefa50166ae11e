//! Error types shared across the bridge crates.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Account credentials are missing a field or malformed
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// I/O failure while reading a configuration file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Shorthand for a credentials error.
    pub fn credentials(msg: impl Into<String>) -> Self {
        Self::InvalidCredentials(msg.into())
    }
}
