//! Account-derived secrets: MQTT login and per-request security context.

use base64::Engine;
use md5::{Digest, Md5};
use rand::RngCore;
use rrbridge_core::RriotCredentials;
use serde::{Deserialize, Serialize};

pub(crate) fn md5_bytes(data: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&Md5::digest(data));
    out
}

pub(crate) fn md5_hex(data: &str) -> String {
    hex::encode(md5_bytes(data.as_bytes()))
}

/// MQTT login derived from the account credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct MqttAuth {
    pub username: String,
    pub password: String,
}

impl MqttAuth {
    /// `username = md5(u:k)[2..10]`, `password = md5(s:k)[16..]` (hex).
    pub fn derive(credentials: &RriotCredentials) -> Self {
        let user_hash = md5_hex(&format!("{}:{}", credentials.u, credentials.k));
        let pass_hash = md5_hex(&format!("{}:{}", credentials.s, credentials.k));
        Self {
            username: user_hash[2..10].to_string(),
            password: pass_hash[16..].to_string(),
        }
    }
}

impl std::fmt::Debug for MqttAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Security block attached to every RPC request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityContext {
    pub endpoint: String,
    /// Lowercase hex of 16 random bytes
    pub nonce: String,
}

impl SecurityContext {
    /// Fresh context for one request: `endpoint = base64(md5(k)[8..14])` and a
    /// random nonce.
    pub fn for_account(credentials: &RriotCredentials) -> Self {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self::with_nonce(credentials, nonce)
    }

    pub fn with_nonce(credentials: &RriotCredentials, nonce: [u8; 16]) -> Self {
        let digest = md5_bytes(credentials.k.as_bytes());
        Self {
            endpoint: base64::engine::general_purpose::STANDARD.encode(&digest[8..14]),
            nonce: hex::encode(nonce),
        }
    }
}
