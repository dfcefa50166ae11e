//! Testing utilities for rrbridge
//!
//! This crate provides:
//! - A simulated device fleet implementing the transport seam
//! - Fixture helpers (credentials, unique ids, a ready-made bridge)

pub mod fleet;
pub mod test_utils;

pub use fleet::{
    DeviceBehavior, ReceivedCommand, SimulatedConnector, SimulatedDevice, SimulatedTransport,
    TransportCall,
};
pub use test_utils::{
    bridge_service, sample_credentials, sample_credentials_json, test_id, unique_device_id,
    unique_user_id, wait_until, LOCAL_KEY,
};
