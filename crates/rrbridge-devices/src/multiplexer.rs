//! Per-session device subscription multiplexer.
//!
//! Each device of a session has at most one live inbound subscription. A new
//! request to a device replaces the registered handler: the old subscription
//! is cancelled first, then a new one is opened with the new handler. A reply
//! still in flight for the superseded handler is lost; callers that need
//! several outstanding commands on one device must serialize them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::BridgeResult;
use crate::transport::{InboundSender, SubscriptionToken, Transport};

/// The live subscription for one device.
#[derive(Debug, Clone)]
pub struct DeviceSubscription {
    pub device_id: String,
    pub topic: String,
    pub token: SubscriptionToken,
    /// How many times the handler has been swapped since the first subscribe
    pub generation: u64,
    pub subscribed_at: DateTime<Utc>,
}

type Slot = Arc<Mutex<Option<DeviceSubscription>>>;

/// Keeps one subscription per device on a single transport.
pub struct SubscriptionMultiplexer {
    transport: Arc<dyn Transport>,
    /// device_id -> slot; the slot lock serializes swaps on one device only
    slots: DashMap<String, Slot>,
}

impl SubscriptionMultiplexer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            slots: DashMap::new(),
        }
    }

    /// Make `handler` the only live handler for `device_id`.
    pub async fn ensure(
        &self,
        device_id: &str,
        topic: &str,
        handler: InboundSender,
    ) -> BridgeResult<SubscriptionToken> {
        let slot = self.slot(device_id);
        let mut current = slot.lock().await;

        let generation = match current.take() {
            Some(previous) => {
                debug!(
                    device_id,
                    token = %previous.token,
                    held_ms = (Utc::now() - previous.subscribed_at).num_milliseconds(),
                    "Replacing inbound handler"
                );
                if let Err(e) = self.transport.unsubscribe(previous.token).await {
                    warn!(device_id, "Failed to cancel previous subscription: {}", e);
                }
                previous.generation + 1
            }
            None => 0,
        };

        let token = self.transport.subscribe(topic, handler).await?;
        *current = Some(DeviceSubscription {
            device_id: device_id.to_string(),
            topic: topic.to_string(),
            token,
            generation,
            subscribed_at: Utc::now(),
        });
        Ok(token)
    }

    /// Cancel every subscription. Returns how many were live.
    pub async fn teardown(&self) -> usize {
        let slots: Vec<(String, Slot)> = self
            .slots
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        self.slots.clear();

        let mut cancelled = 0;
        for (device_id, slot) in slots {
            if let Some(subscription) = slot.lock().await.take() {
                if let Err(e) = self.transport.unsubscribe(subscription.token).await {
                    warn!(device_id = %device_id, "Failed to unsubscribe during teardown: {}", e);
                }
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Snapshot of the live subscription for a device.
    pub async fn subscription(&self, device_id: &str) -> Option<DeviceSubscription> {
        let slot = self.slots.get(device_id).map(|entry| entry.value().clone())?;
        let guard = slot.lock().await;
        guard.clone()
    }

    /// Devices that currently have a live subscription.
    pub async fn active_devices(&self) -> Vec<String> {
        let slots: Vec<(String, Slot)> = self
            .slots
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut devices = Vec::new();
        for (device_id, slot) in slots {
            if slot.lock().await.is_some() {
                devices.push(device_id);
            }
        }
        devices.sort();
        devices
    }

    fn slot(&self, device_id: &str) -> Slot {
        self.slots
            .entry(device_id.to_string())
            .or_default()
            .value()
            .clone()
    }
}
