//! Bridge facade used by the HTTP surface and the one-shot CLI.

use std::sync::Arc;
use std::time::Duration;

use rrbridge_core::{BridgeConfig, RriotCredentials};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::correlator::{Outcome, RequestCorrelator};
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::MessageCodec;
use crate::session::{SessionRegistry, UserSession};
use crate::transport::Connector;

/// Method name of the status query.
pub const GET_STATUS: &str = "get_status";

/// Point-in-time view of the bridge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub active_sessions: usize,
    pub users: Vec<String>,
    pub pending_requests: usize,
}

/// Sessions, subscriptions and request correlation behind one handle.
pub struct BridgeService {
    registry: SessionRegistry,
    correlator: RequestCorrelator,
    command_timeout: Duration,
    status_timeout: Duration,
}

impl BridgeService {
    pub fn new(
        connector: Arc<dyn Connector>,
        codec: Arc<dyn MessageCodec>,
        config: &BridgeConfig,
    ) -> Self {
        Self::with_timeouts(
            connector,
            codec,
            config.command_timeout(),
            config.status_timeout(),
        )
    }

    pub fn with_timeouts(
        connector: Arc<dyn Connector>,
        codec: Arc<dyn MessageCodec>,
        command_timeout: Duration,
        status_timeout: Duration,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(connector),
            correlator: RequestCorrelator::new(codec),
            command_timeout,
            status_timeout,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn correlator(&self) -> &RequestCorrelator {
        &self.correlator
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub fn status_timeout(&self) -> Duration {
        self.status_timeout
    }

    /// Open (or reopen) the session for `user_id`.
    ///
    /// The previous session is torn down even when opening the new one fails,
    /// so its pending requests are failed in both cases.
    #[instrument(skip(self, credentials))]
    pub async fn initialize(&self, user_id: &str, credentials: RriotCredentials) -> BridgeResult<()> {
        let (replaced, result) = self.registry.initialize(user_id, credentials).await;
        if let Some(replaced) = replaced {
            self.fail_pending(&replaced);
        }
        result
    }

    /// Send a command using the default command timeout.
    pub async fn send_command(
        &self,
        user_id: &str,
        device_id: &str,
        local_key: &str,
        command: &str,
        params: Option<Value>,
    ) -> BridgeResult<Outcome> {
        self.send_command_with_timeout(
            user_id,
            device_id,
            local_key,
            command,
            params,
            self.command_timeout,
        )
        .await
    }

    #[instrument(skip(self, local_key, params))]
    pub async fn send_command_with_timeout(
        &self,
        user_id: &str,
        device_id: &str,
        local_key: &str,
        command: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> BridgeResult<Outcome> {
        let session = self
            .registry
            .get(user_id)
            .ok_or_else(|| BridgeError::not_initialized(user_id))?;

        self.correlator
            .send(&session, device_id, local_key, command, params, timeout)
            .await
    }

    /// Query device status.
    ///
    /// Devices answer `get_status` with a list holding one status object; a
    /// successful non-empty list is unwrapped to its first element.
    pub async fn get_status(
        &self,
        user_id: &str,
        device_id: &str,
        local_key: &str,
    ) -> BridgeResult<Outcome> {
        let outcome = self
            .send_command_with_timeout(
                user_id,
                device_id,
                local_key,
                GET_STATUS,
                None,
                self.status_timeout,
            )
            .await?;

        Ok(match outcome {
            Outcome::Success(Value::Array(items)) if !items.is_empty() => {
                Outcome::Success(items.into_iter().next().unwrap_or(Value::Null))
            }
            other => other,
        })
    }

    /// Close the session for `user_id`. Returns whether one existed.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, user_id: &str) -> bool {
        match self.registry.close(user_id).await {
            Some(session) => {
                self.fail_pending(&session);
                true
            }
            None => false,
        }
    }

    /// Close every session. Returns how many were closed.
    pub async fn shutdown(&self) -> usize {
        let closed = self.registry.shutdown().await;
        for session in &closed {
            self.fail_pending(session);
        }
        info!("Bridge shut down, {} session(s) closed", closed.len());
        closed.len()
    }

    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            active_sessions: self.registry.len(),
            users: self.registry.user_ids(),
            pending_requests: self.correlator.pending_count(),
        }
    }

    fn fail_pending(&self, session: &UserSession) {
        let failed = self.correlator.fail_session(session.id());
        if failed > 0 {
            info!(
                user_id = %session.user_id(),
                failed,
                "Failed pending requests of closed session"
            );
        }
    }
}
