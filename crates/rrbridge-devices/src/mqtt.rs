//! MQTT transport built on rumqttc.
//!
//! One [`MqttTransport`] is one broker connection for one account. Incoming
//! publishes are routed by exact topic to the handler registered for it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rrbridge_core::{MqttSettings, RriotCredentials};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::protocol::MqttAuth;
use crate::transport::{
    Connector, InboundSender, SubscriptionToken, Transport, TransportError, TransportResult,
};

const MAX_PACKET_SIZE: usize = 1024 * 1024;
const MAX_POLL_ERRORS: u32 = 5;

/// Opens one MQTT connection per account.
#[derive(Debug, Clone, Default)]
pub struct MqttConnector {
    settings: MqttSettings,
}

impl MqttConnector {
    pub fn new(settings: MqttSettings) -> Self {
        Self { settings }
    }

    fn options(&self, credentials: &RriotCredentials) -> TransportResult<MqttOptions> {
        let endpoint = credentials
            .mqtt_endpoint()
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let auth = MqttAuth::derive(credentials);

        let client_id = format!("{}-{}", auth.username, &Uuid::new_v4().simple().to_string()[..8]);
        let mut options = MqttOptions::new(client_id, endpoint.host, endpoint.port);
        options.set_keep_alive(self.settings.keep_alive());
        options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
        options.set_credentials(auth.username, auth.password);
        if endpoint.tls {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }
        Ok(options)
    }
}

#[async_trait]
impl Connector for MqttConnector {
    async fn connect(&self, credentials: &RriotCredentials) -> TransportResult<Arc<dyn Transport>> {
        let options = self.options(credentials)?;
        let (host, port) = options.broker_address();
        let broker = format!("{host}:{port}");
        let (client, mut eventloop) =
            AsyncClient::new(options, self.settings.channel_capacity);

        let timeout = self.settings.connect_timeout();
        match tokio::time::timeout(timeout, wait_for_connack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(TransportError::Timeout(timeout.as_millis() as u64)),
        }
        info!("Connected to MQTT broker {}", broker);

        let transport = Arc::new(MqttTransport::new(client));
        transport.spawn_event_loop(eventloop, broker);
        Ok(transport)
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> TransportResult<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(TransportError::Connection(format!(
                        "broker refused connection: {code:?}"
                    ))),
                };
            }
            Ok(_) => {}
            Err(e) => return Err(TransportError::Connection(e.to_string())),
        }
    }
}

struct Route {
    token: SubscriptionToken,
    handler: InboundSender,
}

/// A live broker connection.
pub struct MqttTransport {
    client: AsyncClient,
    /// topic -> current handler
    routes: Arc<DashMap<String, Route>>,
    /// token id -> topic
    tokens: DashMap<u64, String>,
    next_token: AtomicU64,
    running: Arc<AtomicBool>,
}

impl MqttTransport {
    fn new(client: AsyncClient) -> Self {
        Self {
            client,
            routes: Arc::new(DashMap::new()),
            tokens: DashMap::new(),
            next_token: AtomicU64::new(1),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    fn spawn_event_loop(&self, mut eventloop: EventLoop, broker: String) {
        let routes = self.routes.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            let mut error_count = 0;

            while running.load(Ordering::SeqCst) {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        error_count = 0;
                        deliver(&routes, &publish.topic, publish.payload.to_vec());
                    }
                    Ok(_) => error_count = 0,
                    Err(e) => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        error_count += 1;
                        if error_count >= MAX_POLL_ERRORS {
                            error!(
                                "MQTT broker {} error count reached {}, stopping: {}",
                                broker, MAX_POLL_ERRORS, e
                            );
                            break;
                        }
                        warn!(
                            "MQTT broker {} error ({}/{}): {}",
                            broker, error_count, MAX_POLL_ERRORS, e
                        );
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }

            running.store(false, Ordering::SeqCst);
            routes.clear();
            info!("MQTT broker {} connection closed", broker);
        });
    }

    fn ensure_running(&self) -> TransportResult<()> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }
}

fn deliver(routes: &DashMap<String, Route>, topic: &str, payload: Vec<u8>) {
    match routes.get(topic) {
        Some(route) => {
            if route.handler.send(payload).is_err() {
                debug!(topic, token = %route.token, "Handler gone, dropping message");
            }
        }
        None => debug!(topic, "No handler for message"),
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn subscribe(
        &self,
        topic: &str,
        handler: InboundSender,
    ) -> TransportResult<SubscriptionToken> {
        self.ensure_running()?;
        let token = SubscriptionToken::new(self.next_token.fetch_add(1, Ordering::Relaxed));

        if let Some(previous) = self
            .routes
            .insert(topic.to_string(), Route { token, handler })
        {
            self.tokens.remove(&previous.token.id());
        }
        self.tokens.insert(token.id(), topic.to_string());

        if let Err(e) = self.client.subscribe(topic, QoS::AtLeastOnce).await {
            self.routes.remove_if(topic, |_, route| route.token == token);
            self.tokens.remove(&token.id());
            return Err(TransportError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            });
        }
        debug!(topic, %token, "Subscribed");
        Ok(token)
    }

    async fn unsubscribe(&self, token: SubscriptionToken) -> TransportResult<()> {
        let Some((_, topic)) = self.tokens.remove(&token.id()) else {
            return Ok(());
        };
        if self
            .routes
            .remove_if(&topic, |_, route| route.token == token)
            .is_none()
        {
            return Ok(());
        }
        if !self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.client
            .unsubscribe(&topic)
            .await
            .map_err(|e| TransportError::Unsubscribe {
                topic: topic.clone(),
                reason: e.to_string(),
            })?;
        debug!(topic = %topic, %token, "Unsubscribed");
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> TransportResult<()> {
        self.ensure_running()?;
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn close(&self) -> TransportResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.routes.clear();
        self.tokens.clear();
        self.client
            .disconnect()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))
    }
}
