//! Bridge configuration.
//!
//! Values are resolved from, lowest to highest precedence: built-in defaults,
//! an optional TOML file, then `RRBRIDGE_*` environment variables. The CLI
//! applies its own flags on top.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default bind host for the control surface.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default control port.
pub const DEFAULT_PORT: u16 = 9876;
/// Default reply window for ordinary commands.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;
/// Default reply window for the status query.
pub const DEFAULT_STATUS_TIMEOUT_SECS: u64 = 15;
/// Default MQTT keep-alive interval.
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;
/// Default MQTT request channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;
/// Default bound on the MQTT connect handshake.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Environment variable names.
pub mod env_vars {
    pub const HOST: &str = "RRBRIDGE_HOST";
    pub const PORT: &str = "RRBRIDGE_PORT";
    pub const COMMAND_TIMEOUT_SECS: &str = "RRBRIDGE_COMMAND_TIMEOUT_SECS";
    pub const STATUS_TIMEOUT_SECS: &str = "RRBRIDGE_STATUS_TIMEOUT_SECS";
    pub const LOG_JSON: &str = "RRBRIDGE_LOG_JSON";
}

/// MQTT client tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttSettings {
    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Capacity of the client request channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Upper bound on waiting for CONNACK
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_keep_alive() -> u64 {
    DEFAULT_KEEP_ALIVE_SECS
}
fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}
fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl MqttSettings {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Host the control surface binds to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the control surface binds to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Reply window for `/command`
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Reply window for the status query
    #[serde(default = "default_status_timeout")]
    pub status_timeout_secs: u64,

    #[serde(default)]
    pub mqtt: MqttSettings,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}
fn default_status_timeout() -> u64 {
    DEFAULT_STATUS_TIMEOUT_SECS
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            status_timeout_secs: DEFAULT_STATUS_TIMEOUT_SECS,
            mqtt: MqttSettings::default(),
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(e.to_string()))
    }

    /// Load a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Resolve defaults, the optional file, and environment overrides, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let config = Self::from_file(path)?;
                tracing::debug!(path = %path.display(), "Loaded configuration file");
                config
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    ///
    /// Takes the lookup as a closure so tests don't have to touch the
    /// process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(env_vars::HOST) {
            self.host = host;
        }
        if let Some(port) = lookup(env_vars::PORT) {
            self.port = parse_env(env_vars::PORT, &port)?;
        }
        if let Some(secs) = lookup(env_vars::COMMAND_TIMEOUT_SECS) {
            self.command_timeout_secs = parse_env(env_vars::COMMAND_TIMEOUT_SECS, &secs)?;
        }
        if let Some(secs) = lookup(env_vars::STATUS_TIMEOUT_SECS) {
            self.status_timeout_secs = parse_env(env_vars::STATUS_TIMEOUT_SECS, &secs)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::config("port must be non-zero"));
        }
        if self.command_timeout_secs == 0 {
            return Err(Error::config("command_timeout_secs must be non-zero"));
        }
        if self.status_timeout_secs == 0 {
            return Err(Error::config("status_timeout_secs must be non-zero"));
        }
        if self.mqtt.channel_capacity == 0 {
            return Err(Error::config("mqtt.channel_capacity must be non-zero"));
        }
        if self.mqtt.connect_timeout_secs == 0 {
            return Err(Error::config("mqtt.connect_timeout_secs must be non-zero"));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{key} has an invalid value: {value}")))
}

/// Whether JSON log output was requested through the environment.
pub fn json_logging_requested() -> bool {
    std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false)
}
