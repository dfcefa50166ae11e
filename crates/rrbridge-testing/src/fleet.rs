//! In-memory device fleet standing in for the MQTT broker.
//!
//! [`SimulatedConnector`] hands out [`SimulatedTransport`]s that share one
//! fleet state: the registered devices, a log of every transport call and a
//! few counters. Publishing a command to a known device makes it answer on the
//! reply channel according to its [`DeviceBehavior`], encoded with the real
//! wire codec, to whatever handler is registered when the reply is delivered.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rrbridge_core::RriotCredentials;
use rrbridge_devices::{
    CommandRequest, Connector, DeviceTopics, InboundSender, MessageBody, MessageCodec, RpcReply,
    SubscriptionToken, Transport, TransportError, TransportResult, V1Codec,
};
use serde_json::Value;
use tracing::{debug, warn};

/// How a simulated device answers a command.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceBehavior {
    /// Never answers
    Silent,
    /// Answers with this result
    Reply(Value),
    /// Answers with this device error
    Fail(Value),
    /// Answers with bytes that are not a frame
    Garbage,
}

/// A device registered with the fleet.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    pub device_id: String,
    pub local_key: String,
    pub behavior: DeviceBehavior,
    /// Time between receiving a command and delivering the answer
    pub delay: Duration,
}

impl SimulatedDevice {
    pub fn new(device_id: impl Into<String>, local_key: impl Into<String>, behavior: DeviceBehavior) -> Self {
        Self {
            device_id: device_id.into(),
            local_key: local_key.into(),
            behavior,
            delay: Duration::ZERO,
        }
    }

    pub fn replying(device_id: impl Into<String>, local_key: impl Into<String>, result: Value) -> Self {
        Self::new(device_id, local_key, DeviceBehavior::Reply(result))
    }

    pub fn silent(device_id: impl Into<String>, local_key: impl Into<String>) -> Self {
        Self::new(device_id, local_key, DeviceBehavior::Silent)
    }

    pub fn failing(device_id: impl Into<String>, local_key: impl Into<String>, error: Value) -> Self {
        Self::new(device_id, local_key, DeviceBehavior::Fail(error))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect { account: String },
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Publish { topic: String },
    Close { account: String },
}

/// A command a simulated device received.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedCommand {
    pub device_id: String,
    pub request: CommandRequest,
}

#[derive(Default)]
struct FleetState {
    devices: DashMap<String, SimulatedDevice>,
    calls: Mutex<Vec<TransportCall>>,
    received: Mutex<Vec<ReceivedCommand>>,
    transports: Mutex<Vec<Arc<SimulatedTransport>>>,
    fail_connect: AtomicBool,
    fail_publish: AtomicBool,
    /// topic -> live subscriptions across every transport
    active: DashMap<String, usize>,
    max_active: AtomicUsize,
    codec: V1Codec,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FleetState {
    fn record(&self, call: TransportCall) {
        lock(&self.calls).push(call);
    }

    fn subscription_opened(&self, topic: &str) {
        let mut count = self.active.entry(topic.to_string()).or_insert(0);
        *count += 1;
        self.max_active.fetch_max(*count, Ordering::SeqCst);
    }

    fn subscription_closed(&self, topic: &str) {
        if let Some(mut count) = self.active.get_mut(topic) {
            *count = count.saturating_sub(1);
        }
    }
}

/// Connector for the simulated fleet. Clones share the same fleet.
#[derive(Clone, Default)]
pub struct SimulatedConnector {
    state: Arc<FleetState>,
}

impl SimulatedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device, replacing any device with the same id.
    pub fn add_device(&self, device: SimulatedDevice) {
        self.state.devices.insert(device.device_id.clone(), device);
    }

    pub fn set_behavior(&self, device_id: &str, behavior: DeviceBehavior) {
        if let Some(mut device) = self.state.devices.get_mut(device_id) {
            device.behavior = behavior;
        }
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.state.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Every transport call so far, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.state.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.state.calls).len()
    }

    fn count(&self, pred: impl Fn(&TransportCall) -> bool) -> usize {
        lock(&self.state.calls).iter().filter(|c| pred(*c)).count()
    }

    pub fn connect_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Connect { .. }))
    }

    pub fn subscribe_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Subscribe { .. }))
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Unsubscribe { .. }))
    }

    pub fn publish_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Publish { .. }))
    }

    pub fn close_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Close { .. }))
    }

    /// Commands the devices decoded, in arrival order.
    pub fn received_commands(&self) -> Vec<ReceivedCommand> {
        lock(&self.state.received).clone()
    }

    /// Live subscriptions on `topic` right now.
    pub fn active_subscriptions(&self, topic: &str) -> usize {
        self.state.active.get(topic).map(|c| *c).unwrap_or(0)
    }

    /// Highest number of simultaneous live subscriptions seen on any topic.
    pub fn max_active_subscriptions(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    /// Transports opened so far, oldest first.
    pub fn transports(&self) -> Vec<Arc<SimulatedTransport>> {
        lock(&self.state.transports).clone()
    }

    pub fn last_transport(&self) -> Option<Arc<SimulatedTransport>> {
        lock(&self.state.transports).last().cloned()
    }
}

#[async_trait]
impl Connector for SimulatedConnector {
    async fn connect(&self, credentials: &RriotCredentials) -> TransportResult<Arc<dyn Transport>> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Connection(
                "simulated broker unreachable".to_string(),
            ));
        }
        self.state.record(TransportCall::Connect {
            account: credentials.u.clone(),
        });

        let transport = Arc::new(SimulatedTransport::new(
            self.state.clone(),
            credentials.u.clone(),
        ));
        lock(&self.state.transports).push(transport.clone());
        Ok(transport)
    }
}

struct Route {
    token: SubscriptionToken,
    handler: InboundSender,
}

/// One simulated broker connection.
pub struct SimulatedTransport {
    state: Arc<FleetState>,
    account: String,
    routes: Arc<DashMap<String, Route>>,
    tokens: DashMap<u64, String>,
    next_token: AtomicU64,
    closed: AtomicBool,
}

impl SimulatedTransport {
    fn new(state: Arc<FleetState>, account: String) -> Self {
        Self {
            state,
            account,
            routes: Arc::new(DashMap::new()),
            tokens: DashMap::new(),
            next_token: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Topics with a registered handler, sorted.
    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.routes.iter().map(|r| r.key().clone()).collect();
        topics.sort();
        topics
    }

    /// Deliver `payload` to the handler currently registered on `topic`.
    /// Returns whether a live handler took it.
    pub fn inject(&self, topic: &str, payload: Vec<u8>) -> bool {
        deliver(&self.routes, topic, payload)
    }

    fn answer(&self, outbound: &str, payload: &[u8]) {
        let Some(device_id) = DeviceTopics::device_id_of(outbound) else {
            return;
        };
        let Some(device) = self.state.devices.get(device_id).map(|d| d.clone()) else {
            debug!(device_id, "No simulated device, command dropped");
            return;
        };
        let Some(reply_topic) = DeviceTopics::reply_topic_for(outbound) else {
            return;
        };

        let request = match self.state.codec.decode(payload, &device.local_key) {
            Ok(messages) => messages.into_iter().find_map(|m| match m.body {
                MessageBody::RpcRequest(request) => Some(request),
                _ => None,
            }),
            Err(e) => {
                warn!(device_id, "Simulated device could not decode command: {}", e);
                None
            }
        };
        let Some(request) = request else {
            return;
        };
        lock(&self.state.received).push(ReceivedCommand {
            device_id: device.device_id.clone(),
            request: request.clone(),
        });

        let reply = match &device.behavior {
            DeviceBehavior::Silent => return,
            DeviceBehavior::Reply(result) => self
                .state
                .codec
                .encode_reply(&RpcReply::ok(request.id, result.clone()), &device.local_key),
            DeviceBehavior::Fail(error) => self
                .state
                .codec
                .encode_reply(&RpcReply::failed(request.id, error.clone()), &device.local_key),
            DeviceBehavior::Garbage => Ok(b"not a device frame".to_vec()),
        };
        let reply = match reply {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(device_id, "Simulated device could not encode reply: {}", e);
                return;
            }
        };

        let routes = self.routes.clone();
        let delay = device.delay;
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            deliver(&routes, &reply_topic, reply);
        });
    }
}

fn deliver(routes: &DashMap<String, Route>, topic: &str, payload: Vec<u8>) -> bool {
    match routes.get(topic) {
        Some(route) => route.handler.send(payload).is_ok(),
        None => {
            debug!(topic, "No handler registered, message dropped");
            false
        }
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn subscribe(
        &self,
        topic: &str,
        handler: InboundSender,
    ) -> TransportResult<SubscriptionToken> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.state.record(TransportCall::Subscribe {
            topic: topic.to_string(),
        });

        let token = SubscriptionToken::new(self.next_token.fetch_add(1, Ordering::Relaxed));
        match self
            .routes
            .insert(topic.to_string(), Route { token, handler })
        {
            Some(previous) => {
                self.tokens.remove(&previous.token.id());
            }
            None => self.state.subscription_opened(topic),
        }
        self.tokens.insert(token.id(), topic.to_string());
        Ok(token)
    }

    async fn unsubscribe(&self, token: SubscriptionToken) -> TransportResult<()> {
        let Some((_, topic)) = self.tokens.remove(&token.id()) else {
            return Ok(());
        };
        if self
            .routes
            .remove_if(&topic, |_, route| route.token == token)
            .is_some()
        {
            self.state.subscription_closed(&topic);
            self.state.record(TransportCall::Unsubscribe { topic });
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.state.record(TransportCall::Publish {
            topic: topic.to_string(),
        });
        if self.state.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::Publish {
                topic: topic.to_string(),
                reason: "simulated publish failure".to_string(),
            });
        }
        self.answer(topic, &payload);
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.state.record(TransportCall::Close {
            account: self.account.clone(),
        });
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let topics: Vec<String> = self.routes.iter().map(|r| r.key().clone()).collect();
        for topic in topics {
            if self.routes.remove(&topic).is_some() {
                self.state.subscription_closed(&topic);
            }
        }
        self.tokens.clear();
        Ok(())
    }
}
