//! Publish/subscribe transport seam.
//!
//! The bridge only needs five things from the underlying connection: connect,
//! subscribe, unsubscribe, publish and close. Inbound payloads are delivered
//! to the channel sender handed to [`Transport::subscribe`], so the consumer of
//! a subscription is a plain stream reader rather than a callback.

use std::sync::Arc;

use async_trait::async_trait;
use rrbridge_core::RriotCredentials;
use thiserror::Error;
use tokio::sync::mpsc;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connect or handshake failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Subscribe request rejected or not sent
    #[error("Subscribe failed on {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    /// Unsubscribe request not sent
    #[error("Unsubscribe failed on {topic}: {reason}")]
    Unsubscribe { topic: String, reason: String },

    /// Publish request not sent
    #[error("Publish failed on {topic}: {reason}")]
    Publish { topic: String, reason: String },

    /// Operation timeout
    #[error("Operation timeout after {0}ms")]
    Timeout(u64),

    /// The connection has been closed
    #[error("Transport is closed")]
    Closed,
}

/// Receiving end of an inbound subscription.
pub type InboundSender = mpsc::UnboundedSender<Vec<u8>>;

/// Reading end paired with an [`InboundSender`].
pub type InboundReceiver = mpsc::UnboundedReceiver<Vec<u8>>;

/// Create a fresh inbound handler pair.
pub fn inbound_channel() -> (InboundSender, InboundReceiver) {
    mpsc::unbounded_channel()
}

/// Handle returned by [`Transport::subscribe`], used to cancel that exact
/// subscription later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(u64);

impl SubscriptionToken {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// An open connection to the device fleet.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start delivering payloads published on `topic` to `handler`.
    ///
    /// A later subscription on the same topic replaces the handler.
    async fn subscribe(&self, topic: &str, handler: InboundSender)
        -> TransportResult<SubscriptionToken>;

    /// Cancel a subscription. Unknown or superseded tokens are a no-op.
    async fn unsubscribe(&self, token: SubscriptionToken) -> TransportResult<()>;

    /// Publish a payload on `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> TransportResult<()>;

    /// Close the connection, dropping every registered handler.
    async fn close(&self) -> TransportResult<()>;
}

/// Opens [`Transport`] connections from account credentials.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, credentials: &RriotCredentials) -> TransportResult<Arc<dyn Transport>>;
}

/// Inbound/outbound channel names for one device of one account.
///
/// Inbound replies arrive on `rr/m/o/{realm}/{account}/{device_id}`; commands
/// are published to `rr/m/i/{realm}/{account}/{device_id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    pub inbound: String,
    pub outbound: String,
}

impl DeviceTopics {
    pub fn new(realm: &str, account: &str, device_id: &str) -> Self {
        Self {
            inbound: format!("rr/m/o/{realm}/{account}/{device_id}"),
            outbound: format!("rr/m/i/{realm}/{account}/{device_id}"),
        }
    }

    /// Map an outbound channel to the inbound channel of the same device.
    pub fn reply_topic_for(outbound: &str) -> Option<String> {
        outbound
            .strip_prefix("rr/m/i/")
            .map(|rest| format!("rr/m/o/{rest}"))
    }

    /// Device identifier carried in the last channel segment.
    pub fn device_id_of(topic: &str) -> Option<&str> {
        topic.rsplit('/').next().filter(|s| !s.is_empty())
    }
}
