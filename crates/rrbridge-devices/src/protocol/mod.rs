//! Device wire protocol.
//!
//! The correlator only depends on [`MessageCodec`]; [`V1Codec`] is the
//! framing spoken by the vendor's MQTT devices.

pub mod security;
pub mod v1;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use security::{MqttAuth, SecurityContext};
pub use v1::V1Codec;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Error type for encoding and decoding device messages.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Frame shorter than its header claims
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// Frame version other than the one this codec speaks
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    /// CRC mismatch
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    Checksum { expected: u32, actual: u32 },

    /// Payload could not be decrypted
    #[error("decryption failed: {0}")]
    Decrypt(String),

    /// Payload too large for the length field
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Payload decrypted but its content is not what the protocol requires
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Message protocol number carried in every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    HelloRequest,
    HelloResponse,
    PingRequest,
    PingResponse,
    GeneralRequest,
    GeneralResponse,
    RpcRequest,
    RpcResponse,
    MapResponse,
    Other(u16),
}

impl Protocol {
    pub fn code(self) -> u16 {
        match self {
            Self::HelloRequest => 0,
            Self::HelloResponse => 1,
            Self::PingRequest => 2,
            Self::PingResponse => 3,
            Self::GeneralRequest => 4,
            Self::GeneralResponse => 5,
            Self::RpcRequest => 101,
            Self::RpcResponse => 102,
            Self::MapResponse => 301,
            Self::Other(code) => code,
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            0 => Self::HelloRequest,
            1 => Self::HelloResponse,
            2 => Self::PingRequest,
            3 => Self::PingResponse,
            4 => Self::GeneralRequest,
            5 => Self::GeneralResponse,
            101 => Self::RpcRequest,
            102 => Self::RpcResponse,
            301 => Self::MapResponse,
            other => Self::Other(other),
        }
    }

    /// The data-point key that carries this protocol's body inside `dps`.
    fn dps_key(self) -> String {
        self.code().to_string()
    }
}

/// Outbound RPC call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Device-side call id, echoed back in the reply
    pub id: u32,
    pub method: String,
    #[serde(default = "empty_params")]
    pub params: Value,
}

fn empty_params() -> Value {
    Value::Array(Vec::new())
}

impl CommandRequest {
    /// Build a request with a random device-side call id.
    ///
    /// `None` params become an empty list, which is what devices expect for
    /// parameterless methods such as `get_status`.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: rand::thread_rng().gen_range(10_000..32_767),
            method: method.into(),
            params: params.unwrap_or_else(empty_params),
        }
    }
}

/// Reply to an RPC call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcReply {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Application-level failure reported by the device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl RpcReply {
    pub fn ok(id: u32, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(id: u32, error: Value) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Render the device error as text, if there is one.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| match e {
            Value::String(s) => s.clone(),
            Value::Object(map) => match (map.get("message"), map.get("code")) {
                (Some(Value::String(msg)), Some(code)) => format!("{msg} (code {code})"),
                (Some(Value::String(msg)), None) => msg.clone(),
                _ => e.to_string(),
            },
            other => other.to_string(),
        })
    }
}

/// Decoded body of a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    RpcRequest(CommandRequest),
    RpcReply(RpcReply),
    /// Any other protocol; the decrypted payload is kept as-is
    Raw(Vec<u8>),
}

/// One frame pulled out of an inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub protocol: Protocol,
    pub seq: u32,
    pub timestamp: u32,
    pub body: MessageBody,
}

impl DecodedMessage {
    /// Whether this message answers an RPC call.
    pub fn is_reply(&self) -> bool {
        matches!(self.body, MessageBody::RpcReply(_))
    }

    pub fn into_reply(self) -> Option<RpcReply> {
        match self.body {
            MessageBody::RpcReply(reply) => Some(reply),
            _ => None,
        }
    }
}

/// Encodes outbound commands and decodes inbound payloads.
pub trait MessageCodec: Send + Sync {
    fn encode(
        &self,
        request: &CommandRequest,
        security: &SecurityContext,
        local_key: &str,
    ) -> CodecResult<Vec<u8>>;

    /// Decode every frame in `payload`.
    fn decode(&self, payload: &[u8], local_key: &str) -> CodecResult<Vec<DecodedMessage>>;
}
