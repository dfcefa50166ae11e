//! Request and response bodies of the control surface.

pub mod common;
pub mod requests;

pub use common::{BridgeResponse, HealthResponse, COMMAND_TIMEOUT};
pub use requests::{CommandRequestBody, DisconnectRequest, InitRequest};
