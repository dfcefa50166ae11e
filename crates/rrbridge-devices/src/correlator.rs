//! Request/reply correlation over the asynchronous device channel.
//!
//! Every [`RequestCorrelator::send`] registers a pending entry holding a
//! single-assignment reply slot. Three paths may finish it: the inbound
//! consumer that sees the reply, the timeout in `send`, and session teardown.
//! All of them go through [`DashMap::remove`], so exactly one wins and the
//! others find nothing to do.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::BridgeResult;
use crate::protocol::{CommandRequest, MessageCodec, RpcReply, SecurityContext};
use crate::session::UserSession;
use crate::transport::{inbound_channel, InboundReceiver};

/// Error text used when a session is torn down under a waiting request.
pub const SESSION_CLOSED: &str = "Session closed";

/// Classified result of one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The device answered with a result
    Success(Value),
    /// The device answered and reported a failure
    DeviceError(String),
    /// No reply within the window
    Timeout,
    /// The round trip broke below the application level
    TransportFailure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    fn from_reply(reply: RpcReply) -> Self {
        match reply.error_message() {
            Some(message) => Self::DeviceError(message),
            None => Self::Success(reply.result.unwrap_or(Value::Null)),
        }
    }
}

/// Process-unique request identifier.
///
/// Uniqueness comes from `seq` alone; user and device are carried for logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId {
    pub seq: u64,
    pub user_id: String,
    pub device_id: String,
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.user_id, self.device_id, self.seq)
    }
}

struct PendingRequest {
    id: RequestId,
    session_id: Uuid,
    /// Device-side call id of the command on the wire
    call_id: u32,
    created_at: Instant,
    slot: oneshot::Sender<Outcome>,
}

type PendingTable = Arc<DashMap<u64, PendingRequest>>;

/// Cleans up after `send` on every exit path, including the caller dropping
/// the future: the reply consumer is aborted and the pending entry, if still
/// present, is removed.
struct InFlight {
    pending: PendingTable,
    seq: u64,
    consumer: JoinHandle<()>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.consumer.abort();
        self.pending.remove(&self.seq);
    }
}

/// Allocates request ids, tracks pending requests and resolves them.
pub struct RequestCorrelator {
    codec: Arc<dyn MessageCodec>,
    next_seq: AtomicU64,
    pending: PendingTable,
}

impl RequestCorrelator {
    pub fn new(codec: Arc<dyn MessageCodec>) -> Self {
        Self {
            codec,
            next_seq: AtomicU64::new(1),
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Allocate the next request id. Never reused within the process.
    pub fn next_request_id(&self, user_id: &str, device_id: &str) -> RequestId {
        RequestId {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
        }
    }

    /// Send `command` to `device_id` on `session` and wait up to `timeout` for
    /// the reply.
    ///
    /// Errors cover failures before the command left (subscribe, encode,
    /// publish). Once published, every result is an [`Outcome`].
    pub async fn send(
        &self,
        session: &UserSession,
        device_id: &str,
        local_key: &str,
        command: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> BridgeResult<Outcome> {
        let id = self.next_request_id(session.user_id(), device_id);
        let request = CommandRequest::new(command, params);
        let topics = session.topics(device_id);

        let (slot, reply) = oneshot::channel();
        let created_at = Instant::now();
        let deadline = created_at + timeout;
        self.pending.insert(
            id.seq,
            PendingRequest {
                id: id.clone(),
                session_id: session.id(),
                call_id: request.id,
                created_at,
                slot,
            },
        );

        let (handler, inbound) = inbound_channel();
        let _in_flight = InFlight {
            pending: self.pending.clone(),
            seq: id.seq,
            consumer: tokio::spawn(consume_replies(
                self.pending.clone(),
                self.codec.clone(),
                id.clone(),
                local_key.to_string(),
                inbound,
            )),
        };

        if let Err(e) = self.dispatch(session, &id, &request, &topics, handler, local_key).await {
            warn!(request_id = %id, "Failed to send command {}: {}", command, e);
            return Err(e);
        }
        info!(request_id = %id, "Sent command {} to device {}", command, device_id);

        Ok(self.wait(&id, reply, deadline).await)
    }

    async fn dispatch(
        &self,
        session: &UserSession,
        id: &RequestId,
        request: &CommandRequest,
        topics: &crate::transport::DeviceTopics,
        handler: crate::transport::InboundSender,
        local_key: &str,
    ) -> BridgeResult<()> {
        session
            .subscriptions()
            .ensure(&id.device_id, &topics.inbound, handler)
            .await?;

        let security = SecurityContext::for_account(session.credentials());
        let payload = self.codec.encode(request, &security, local_key)?;
        session.transport().publish(&topics.outbound, payload).await?;
        Ok(())
    }

    async fn wait(
        &self,
        id: &RequestId,
        mut reply: oneshot::Receiver<Outcome>,
        deadline: Instant,
    ) -> Outcome {
        match tokio::time::timeout_at(deadline, &mut reply).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Outcome::TransportFailure("reply slot dropped".to_string()),
            Err(_) => match self.pending.remove(&id.seq) {
                Some((_, pending)) => {
                    debug!(
                        request_id = %id,
                        call_id = pending.call_id,
                        waited_ms = pending.created_at.elapsed().as_millis() as u64,
                        "Command timed out"
                    );
                    Outcome::Timeout
                }
                // The inbound path took the entry first; its value is in the slot.
                None => reply
                    .await
                    .unwrap_or_else(|_| Outcome::TransportFailure("reply slot dropped".to_string())),
            },
        }
    }

    /// Fail every request still waiting on `session_id`. Returns how many were failed.
    pub fn fail_session(&self, session_id: Uuid) -> usize {
        let seqs: Vec<u64> = self
            .pending
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .map(|entry| *entry.key())
            .collect();

        let mut failed = 0;
        for seq in seqs {
            if let Some((_, pending)) = self.pending.remove(&seq) {
                debug!(request_id = %pending.id, "Failing request of closed session");
                let _ = pending
                    .slot
                    .send(Outcome::TransportFailure(SESSION_CLOSED.to_string()));
                failed += 1;
            }
        }
        failed
    }

    /// Number of requests still waiting.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Resolve the pending entry for `id` if nobody else has.
fn resolve(pending: &PendingTable, id: &RequestId, outcome: Outcome) -> bool {
    match pending.remove(&id.seq) {
        Some((_, request)) => {
            let _ = request.slot.send(outcome);
            true
        }
        None => {
            debug!(request_id = %id, "Discarding reply for finished request");
            false
        }
    }
}

/// Drain one request's inbound channel until a reply-kind message shows up.
///
/// Ends when the handler is superseded (the transport drops the sender), when
/// a reply or decode failure settles the request, or when `send` aborts it.
async fn consume_replies(
    pending: PendingTable,
    codec: Arc<dyn MessageCodec>,
    id: RequestId,
    local_key: String,
    mut inbound: InboundReceiver,
) {
    while let Some(payload) = inbound.recv().await {
        match codec.decode(&payload, &local_key) {
            Ok(messages) => {
                if let Some(reply) = messages.into_iter().find_map(|m| m.into_reply()) {
                    let expected = pending.get(&id.seq).map(|p| p.call_id);
                    if expected.is_some_and(|call_id| call_id != reply.id) {
                        debug!(
                            request_id = %id,
                            reply_id = reply.id,
                            "Reply call id differs from the command sent"
                        );
                    }
                    resolve(&pending, &id, Outcome::from_reply(reply));
                    return;
                }
            }
            Err(e) => {
                warn!(request_id = %id, "Error parsing message: {}", e);
                resolve(
                    &pending,
                    &id,
                    Outcome::TransportFailure(format!("Unexpected error: {e}")),
                );
                return;
            }
        }
    }
}
