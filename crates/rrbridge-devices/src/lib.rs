//! Multi-tenant device bridge.
//!
//! ## Features
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `mqtt` | ✅ | rumqttc-backed transport |
//!
//! ## Architecture
//!
//! - **SessionRegistry**: one transport connection per user
//! - **SubscriptionMultiplexer**: at most one inbound subscription per device,
//!   replaced on every send
//! - **RequestCorrelator**: request ids, pending slots and the reply/timeout race
//! - **BridgeService**: the facade the HTTP surface and the CLI talk to
//!
//! The transport and the wire codec sit behind the [`Transport`]/[`Connector`]
//! and [`MessageCodec`] traits so tests can run against an in-memory fleet.

pub mod correlator;
pub mod error;
pub mod multiplexer;
pub mod protocol;
pub mod service;
pub mod session;
pub mod transport;

#[cfg(feature = "mqtt")]
pub mod mqtt;

pub use correlator::{Outcome, RequestCorrelator, RequestId, SESSION_CLOSED};
pub use error::{BridgeError, BridgeResult};
pub use multiplexer::{DeviceSubscription, SubscriptionMultiplexer};
pub use protocol::{
    CodecError, CommandRequest, DecodedMessage, MessageBody, MessageCodec, MqttAuth, Protocol,
    RpcReply, SecurityContext, V1Codec,
};
pub use service::{BridgeService, HealthSnapshot, GET_STATUS};
pub use session::{SessionRegistry, UserSession};
pub use transport::{
    inbound_channel, Connector, DeviceTopics, InboundReceiver, InboundSender, SubscriptionToken,
    Transport, TransportError, TransportResult,
};

#[cfg(feature = "mqtt")]
pub use mqtt::{MqttConnector, MqttTransport};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
