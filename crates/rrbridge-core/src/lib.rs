//! Shared building blocks for the rrbridge device bridge.
//!
//! - [`config`]: defaults, environment overrides and TOML loading
//! - [`credentials`]: the cloud account material used to open connections
//! - [`error`]: the core error type

pub mod config;
pub mod credentials;
pub mod error;

pub use config::{BridgeConfig, MqttSettings};
pub use credentials::{MqttEndpoint, RriotCredentials, RriotReference};
pub use error::{Error, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
