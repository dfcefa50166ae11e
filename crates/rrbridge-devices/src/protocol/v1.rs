//! `1.0` frame codec.
//!
//! ```text
//! +---------+-------+--------+-----------+----------+---------+-----------+-------+
//! | "1.0"   | seq   | random | timestamp | protocol | len     | payload   | crc32 |
//! | 3 bytes | u32   | u32    | u32       | u16      | u16     | len bytes | u32   |
//! +---------+-------+--------+-----------+----------+---------+-----------+-------+
//! ```
//!
//! All integers are big endian. The payload is AES-128-ECB with PKCS#7
//! padding, keyed by `md5(encode_timestamp(ts) + local_key + SALT)`. The CRC
//! covers every byte before it.

use std::sync::atomic::{AtomicU32, Ordering};

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};

use super::security::md5_bytes;
use super::{
    CodecError, CodecResult, CommandRequest, DecodedMessage, MessageBody, MessageCodec, Protocol,
    RpcReply, SecurityContext,
};

const VERSION: &[u8; 3] = b"1.0";
const SALT: &str = "TXdfu$jyZ#TZHsg4";
const HEADER_LEN: usize = 19;
const CRC_LEN: usize = 4;
const BLOCK: usize = 16;

/// Codec for the `1.0` frame format.
#[derive(Debug)]
pub struct V1Codec {
    seq: AtomicU32,
}

impl Default for V1Codec {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct RequestEnvelope<'a> {
    id: u32,
    method: &'a str,
    params: &'a Value,
    security: &'a SecurityContext,
}

impl V1Codec {
    pub fn new() -> Self {
        Self {
            seq: AtomicU32::new(1),
        }
    }

    fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Encode a device-side RPC reply. Used by device simulators.
    pub fn encode_reply(&self, reply: &RpcReply, local_key: &str) -> CodecResult<Vec<u8>> {
        let ts = now_secs();
        let body = dps_payload(Protocol::RpcResponse, reply, ts)?;
        self.build_frame(Protocol::RpcResponse, &body, local_key, ts)
    }

    /// Assemble one frame around an already-serialized payload.
    pub fn build_frame(
        &self,
        protocol: Protocol,
        payload: &[u8],
        local_key: &str,
        timestamp: u32,
    ) -> CodecResult<Vec<u8>> {
        let encrypted = encrypt(&frame_key(timestamp, local_key), payload);
        let len = u16::try_from(encrypted.len())
            .map_err(|_| CodecError::PayloadTooLarge(encrypted.len()))?;

        let mut frame = Vec::with_capacity(HEADER_LEN + encrypted.len() + CRC_LEN);
        frame.extend_from_slice(VERSION);
        frame.extend_from_slice(&self.next_seq().to_be_bytes());
        frame.extend_from_slice(&rand::thread_rng().gen::<u32>().to_be_bytes());
        frame.extend_from_slice(&timestamp.to_be_bytes());
        frame.extend_from_slice(&protocol.code().to_be_bytes());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&encrypted);
        let crc = crc32fast::hash(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());
        Ok(frame)
    }

    /// Parse the frame at the start of `bytes`, returning it and the number of
    /// bytes it occupied.
    fn parse_frame(&self, bytes: &[u8], local_key: &str) -> CodecResult<(DecodedMessage, usize)> {
        if bytes.len() < HEADER_LEN + CRC_LEN {
            return Err(CodecError::Truncated {
                needed: HEADER_LEN + CRC_LEN,
                available: bytes.len(),
            });
        }
        if &bytes[0..3] != VERSION {
            return Err(CodecError::UnsupportedVersion(
                String::from_utf8_lossy(&bytes[0..3]).into_owned(),
            ));
        }

        let seq = be_u32(&bytes[3..7]);
        let timestamp = be_u32(&bytes[11..15]);
        let protocol = Protocol::from_code(u16::from_be_bytes([bytes[15], bytes[16]]));
        let len = u16::from_be_bytes([bytes[17], bytes[18]]) as usize;

        let body_end = HEADER_LEN + len;
        let total = body_end + CRC_LEN;
        if bytes.len() < total {
            return Err(CodecError::Truncated {
                needed: total,
                available: bytes.len(),
            });
        }

        let expected = be_u32(&bytes[body_end..total]);
        let actual = crc32fast::hash(&bytes[..body_end]);
        if expected != actual {
            return Err(CodecError::Checksum { expected, actual });
        }

        let plain = if len == 0 {
            Vec::new()
        } else {
            decrypt(&frame_key(timestamp, local_key), &bytes[HEADER_LEN..body_end])?
        };

        let body = match protocol {
            Protocol::RpcRequest => MessageBody::RpcRequest(parse_dps(protocol, &plain)?),
            Protocol::RpcResponse => MessageBody::RpcReply(parse_dps(protocol, &plain)?),
            _ => MessageBody::Raw(plain),
        };

        Ok((
            DecodedMessage {
                protocol,
                seq,
                timestamp,
                body,
            },
            total,
        ))
    }
}

impl MessageCodec for V1Codec {
    fn encode(
        &self,
        request: &CommandRequest,
        security: &SecurityContext,
        local_key: &str,
    ) -> CodecResult<Vec<u8>> {
        let ts = now_secs();
        let envelope = RequestEnvelope {
            id: request.id,
            method: &request.method,
            params: &request.params,
            security,
        };
        let body = dps_payload(Protocol::RpcRequest, &envelope, ts)?;
        self.build_frame(Protocol::RpcRequest, &body, local_key, ts)
    }

    fn decode(&self, payload: &[u8], local_key: &str) -> CodecResult<Vec<DecodedMessage>> {
        let mut messages = Vec::new();
        let mut rest = payload;
        while !rest.is_empty() {
            let (message, used) = self.parse_frame(rest, local_key)?;
            messages.push(message);
            rest = &rest[used..];
        }
        Ok(messages)
    }
}

fn now_secs() -> u32 {
    chrono::Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// `{"dps": {"<code>": "<json>"}, "t": ts}`
fn dps_payload<T: Serialize>(protocol: Protocol, inner: &T, ts: u32) -> CodecResult<Vec<u8>> {
    let inner = serde_json::to_string(inner)?;
    let mut dps = serde_json::Map::new();
    dps.insert(protocol.dps_key(), Value::String(inner));
    Ok(serde_json::to_vec(&json!({ "dps": dps, "t": ts }))?)
}

fn parse_dps<T: serde::de::DeserializeOwned>(protocol: Protocol, plain: &[u8]) -> CodecResult<T> {
    let outer: Value = serde_json::from_slice(plain)?;
    let key = protocol.dps_key();
    let point = outer
        .get("dps")
        .and_then(|dps| dps.get(&key))
        .ok_or_else(|| CodecError::Malformed(format!("missing dps.{key}")))?;
    match point {
        Value::String(text) => Ok(serde_json::from_str(text)?),
        other => Ok(serde_json::from_value(other.clone())?),
    }
}

/// Shuffle the hex digits of the timestamp into the order the key schedule uses.
fn encode_timestamp(ts: u32) -> String {
    let hex = format!("{ts:08x}");
    let digits = hex.as_bytes();
    [5, 6, 3, 7, 1, 2, 0, 4]
        .iter()
        .map(|&i| digits[i] as char)
        .collect()
}

fn frame_key(ts: u32, local_key: &str) -> [u8; 16] {
    md5_bytes(format!("{}{}{}", encode_timestamp(ts), local_key, SALT).as_bytes())
}

fn encrypt(key: &[u8; 16], plain: &[u8]) -> Vec<u8> {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let pad = BLOCK - plain.len() % BLOCK;
    let mut buf = Vec::with_capacity(plain.len() + pad);
    buf.extend_from_slice(plain);
    buf.resize(plain.len() + pad, pad as u8);
    for block in buf.chunks_exact_mut(BLOCK) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    buf
}

fn decrypt(key: &[u8; 16], data: &[u8]) -> CodecResult<Vec<u8>> {
    if data.len() % BLOCK != 0 {
        return Err(CodecError::Decrypt(format!(
            "length {} is not a multiple of {BLOCK}",
            data.len()
        )));
    }
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut buf = data.to_vec();
    for block in buf.chunks_exact_mut(BLOCK) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }

    let pad = buf.last().copied().unwrap_or(0) as usize;
    if pad == 0 || pad > BLOCK || buf[buf.len() - pad..].iter().any(|&b| b as usize != pad) {
        return Err(CodecError::Decrypt("bad padding (wrong local key?)".to_string()));
    }
    buf.truncate(buf.len() - pad);
    Ok(buf)
}
