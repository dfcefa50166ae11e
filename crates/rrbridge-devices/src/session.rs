//! Per-user session registry.
//!
//! Each user owns exactly one transport connection plus the device
//! subscriptions opened on it. Lifecycle operations (initialize, close,
//! shutdown) are serialized by a single lock; lookups for command sends never
//! take it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rrbridge_core::RriotCredentials;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::BridgeResult;
use crate::multiplexer::SubscriptionMultiplexer;
use crate::protocol::MqttAuth;
use crate::transport::{Connector, DeviceTopics, Transport};

/// One user's live connection.
pub struct UserSession {
    id: Uuid,
    user_id: String,
    credentials: RriotCredentials,
    /// Channel account segment, derived from the credentials
    account: String,
    transport: Arc<dyn Transport>,
    subscriptions: SubscriptionMultiplexer,
    created_at: DateTime<Utc>,
}

impl UserSession {
    fn new(user_id: &str, credentials: RriotCredentials, transport: Arc<dyn Transport>) -> Self {
        let account = MqttAuth::derive(&credentials).username;
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            credentials,
            account,
            subscriptions: SubscriptionMultiplexer::new(transport.clone()),
            transport,
            created_at: Utc::now(),
        }
    }

    /// Identity of this session instance; a re-initialized user gets a new one.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn credentials(&self) -> &RriotCredentials {
        &self.credentials
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn subscriptions(&self) -> &SubscriptionMultiplexer {
        &self.subscriptions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Channel names for one of this account's devices.
    pub fn topics(&self, device_id: &str) -> DeviceTopics {
        DeviceTopics::new(&self.credentials.u, &self.account, device_id)
    }

    /// Unsubscribe every device, then close the transport.
    async fn teardown(&self) {
        let cancelled = self.subscriptions.teardown().await;
        if let Err(e) = self.transport.close().await {
            warn!(user_id = %self.user_id, "Error closing session: {}", e);
        }
        info!(
            user_id = %self.user_id,
            subscriptions = cancelled,
            age_secs = (Utc::now() - self.created_at).num_seconds(),
            "Closed session"
        );
    }
}

impl std::fmt::Debug for UserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSession")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("account", &self.account)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Registry of live sessions keyed by user id.
pub struct SessionRegistry {
    connector: Arc<dyn Connector>,
    sessions: DashMap<String, Arc<UserSession>>,
    lifecycle: Mutex<()>,
}

impl SessionRegistry {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            sessions: DashMap::new(),
            lifecycle: Mutex::new(()),
        }
    }

    /// Open a session for `user_id`, tearing down any existing one first.
    ///
    /// The session torn down is reported whether or not opening the new one
    /// succeeds. On failure nothing is registered for the user.
    pub async fn initialize(
        &self,
        user_id: &str,
        credentials: RriotCredentials,
    ) -> (Option<Arc<UserSession>>, BridgeResult<()>) {
        let _guard = self.lifecycle.lock().await;

        let replaced = self.remove_locked(user_id).await;
        let result = self.open_locked(user_id, credentials).await;
        (replaced, result)
    }

    /// Must be called with the lifecycle lock held.
    async fn open_locked(&self, user_id: &str, credentials: RriotCredentials) -> BridgeResult<()> {
        credentials.validate()?;
        let transport = self.connector.connect(&credentials).await?;
        let session = Arc::new(UserSession::new(user_id, credentials, transport));
        self.sessions.insert(user_id.to_string(), session);

        info!(user_id, "Initialized session");
        Ok(())
    }

    /// Close the session for `user_id`. Returns the closed session, or `None`
    /// if the user had none.
    pub async fn close(&self, user_id: &str) -> Option<Arc<UserSession>> {
        let _guard = self.lifecycle.lock().await;
        self.remove_locked(user_id).await
    }

    /// Close every session. Returns the closed sessions.
    pub async fn shutdown(&self) -> Vec<Arc<UserSession>> {
        let _guard = self.lifecycle.lock().await;
        info!("Shutting down {} session(s)", self.sessions.len());

        let user_ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let mut closed = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            if let Some(session) = self.remove_locked(&user_id).await {
                closed.push(session);
            }
        }
        closed
    }

    /// Look up a live session without taking the lifecycle lock.
    pub fn get(&self, user_id: &str) -> Option<Arc<UserSession>> {
        self.sessions.get(user_id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Users with a live session, sorted.
    pub fn user_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Must be called with the lifecycle lock held.
    async fn remove_locked(&self, user_id: &str) -> Option<Arc<UserSession>> {
        let (_, session) = self.sessions.remove(user_id)?;
        session.teardown().await;
        Some(session)
    }
}
