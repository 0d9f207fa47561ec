//! MQTT bus client.
//!
//! Subscribes to the sensor and actuator feeds, decodes inbound publishes into
//! [`BusMessage`]s, and publishes commands at QoS 1.
//!
//! # Topic Structure
//!
//! Every feed lives under one prefix, `{username}/feeds` by default:
//!
//! - `{prefix}/temperature`, `{prefix}/humidity`, `{prefix}/light-intensity`,
//!   `{prefix}/infrared` - sensor channels (inbound)
//! - `{prefix}/4-led-rgb-light`, `{prefix}/mini-fan`, `{prefix}/automation` -
//!   actuator state (inbound and outbound)
//! - `{prefix}/fan-threshold`, `{prefix}/light-threshold` - thresholds (outbound)
//!
//! # Example Configuration
//!
//! ```toml
//! [mqtt]
//! broker = "mqtts://io.adafruit.com"
//! username = "alice"
//! password = "aio_xxxx"
//! ack_timeout_secs = 10
//! ```
//!
//! # Acknowledgements
//!
//! The client assigns packet identifiers inside the event loop, in the order
//! requests were queued. Publish requests are queued under the same lock that
//! records their waiters, so the n-th outgoing publish belongs to the n-th
//! waiter. The waiter is resolved when the matching `PUBACK` arrives.
//!
//! # Reconnection
//!
//! The client reconnects automatically after a connection error and
//! resubscribes on every `CONNACK`. Publishes waiting for an acknowledgement
//! when the connection drops fail with [`PublishError::Disconnected`].
//!
//! After reconnecting, the client resends the publishes it never saw
//! acknowledged before it takes new requests, and sends requests that were
//! still queued when the connection dropped. Their waiters have already
//! failed, so those outgoing publishes are skipped when matching waiters. A
//! failed command may therefore still reach the broker late.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use smartroom_types::{BusMessage, ParseError, Topic};

use crate::bus::{BusPublisher, PublishError};
use crate::config::MqttConfig;

/// Delay before the event loop is polled again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Capacity of the client request queue.
const REQUEST_CAPACITY: usize = 100;

/// Errors setting up the MQTT client.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("Invalid MQTT broker URL: {0}")]
    InvalidBrokerUrl(String),

    #[error("No feed prefix: set mqtt.username or mqtt.feed_prefix")]
    MissingFeedPrefix,
}

/// Maps logical topics to broker topic paths and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedNames {
    prefix: String,
}

impl FeedNames {
    /// Feeds under `prefix` (without a trailing slash).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Full topic path of a feed.
    pub fn path(&self, topic: Topic) -> String {
        format!("{}/{}", self.prefix, topic.feed())
    }

    /// Decode an inbound publish.
    pub fn decode(&self, path: &str, payload: &[u8]) -> Result<BusMessage, ParseError> {
        let feed = path
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| ParseError::UnknownTopic(path.to_string()))?;
        let topic = Topic::from_feed(feed)?;

        let payload = std::str::from_utf8(payload).map_err(|_| ParseError::InvalidPayload {
            feed: topic.feed(),
            payload: String::from_utf8_lossy(payload).into_owned(),
        })?;

        BusMessage::decode(topic, payload)
    }
}

type AckSender = oneshot::Sender<Result<(), PublishError>>;

/// Publishes waiting for a broker acknowledgement.
#[derive(Default)]
struct PendingAcks {
    /// Queued on the client, no packet identifier yet.
    queued: VecDeque<AckSender>,
    /// Sent, keyed by packet identifier.
    in_flight: HashMap<u16, AckSender>,
    /// Failed while sent; the client resends these after reconnecting.
    replaying: HashSet<u16>,
    /// Failed while queued; the client still sends these.
    orphaned: usize,
}

impl PendingAcks {
    fn queue(&mut self, tx: AckSender) {
        self.queued.push_back(tx);
    }

    /// The oldest queued publish went out as `pkid`.
    fn sent(&mut self, pkid: u16) {
        if self.replaying.remove(&pkid) {
            debug!("Outgoing publish {} is a resend", pkid);
            return;
        }
        if self.orphaned > 0 {
            self.orphaned -= 1;
            debug!("Outgoing publish {} was queued before the disconnect", pkid);
            return;
        }

        match self.queued.pop_front() {
            Some(tx) => {
                self.in_flight.insert(pkid, tx);
            }
            None => debug!("Outgoing publish {} has no waiter", pkid),
        }
    }

    fn acked(&mut self, pkid: u16) {
        if let Some(tx) = self.in_flight.remove(&pkid) {
            let _ = tx.send(Ok(()));
        }
    }

    fn fail_all(&mut self, error: &PublishError) {
        self.replaying.extend(self.in_flight.keys().copied());
        self.orphaned += self.queued.len();
        for tx in self.queued.drain(..).chain(self.in_flight.drain().map(|(_, tx)| tx)) {
            let _ = tx.send(Err(error.clone()));
        }
    }

    fn len(&self) -> usize {
        self.queued.len() + self.in_flight.len()
    }
}

/// Live connection to the MQTT broker.
pub struct MqttBus {
    client: AsyncClient,
    acks: Arc<Mutex<PendingAcks>>,
    connected: Arc<AtomicBool>,
    feeds: FeedNames,
    stop_tx: watch::Sender<bool>,
}

impl MqttBus {
    /// Connect to the configured broker.
    ///
    /// Spawns the event loop and returns the bus together with the stream of
    /// decoded inbound messages. Connecting happens in the background; until
    /// the broker accepts the connection, publishes fail with
    /// [`PublishError::Disconnected`].
    pub fn connect(
        config: &MqttConfig,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<BusMessage>), MqttError> {
        let (host, port, use_tls) =
            parse_broker_url(&config.broker).map_err(MqttError::InvalidBrokerUrl)?;
        let feeds = FeedNames::new(config.feed_prefix().ok_or(MqttError::MissingFeedPrefix)?);

        let mut mqtt_options = MqttOptions::new(config.client_id(), host, port);
        mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            mqtt_options.set_credentials(username, password);
        }

        if use_tls {
            mqtt_options.set_transport(rumqttc::Transport::tls_with_config(
                rumqttc::TlsConfiguration::Native,
            ));
        }

        let (client, eventloop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let bus = Arc::new(Self {
            client: client.clone(),
            acks: Arc::new(Mutex::new(PendingAcks::default())),
            connected: Arc::new(AtomicBool::new(false)),
            feeds: feeds.clone(),
            stop_tx,
        });

        info!(
            "Connecting to MQTT broker {} with feed prefix '{}'",
            config.broker, feeds.prefix
        );

        let context = EventLoopContext {
            client,
            acks: Arc::clone(&bus.acks),
            connected: Arc::clone(&bus.connected),
            feeds,
            inbound_tx,
        };
        tokio::spawn(run_event_loop(eventloop, context, stop_rx));

        Ok((bus, inbound_rx))
    }

    /// Disconnect from the broker and stop the event loop.
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!("Error disconnecting MQTT client: {}", e);
        }
        let _ = self.stop_tx.send(true);
    }
}

#[async_trait]
impl BusPublisher for MqttBus {
    async fn publish(&self, topic: Topic, payload: String) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::Disconnected);
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut acks = self.acks.lock().await;
            self.client
                .try_publish(self.feeds.path(topic), QoS::AtLeastOnce, false, payload)
                .map_err(|e| PublishError::Rejected {
                    topic,
                    reason: e.to_string(),
                })?;
            acks.queue(tx);
        }

        debug!("Published to {}, waiting for acknowledgement", topic);
        rx.await.unwrap_or(Err(PublishError::Disconnected))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// State shared between the bus handle and its event loop.
struct EventLoopContext {
    client: AsyncClient,
    acks: Arc<Mutex<PendingAcks>>,
    connected: Arc<AtomicBool>,
    feeds: FeedNames,
    inbound_tx: mpsc::UnboundedSender<BusMessage>,
}

impl EventLoopContext {
    fn subscribe_all(&self) {
        for topic in Topic::INBOUND {
            let path = self.feeds.path(topic);
            if let Err(e) = self.client.try_subscribe(path.as_str(), QoS::AtLeastOnce) {
                warn!("Failed to subscribe to {}: {}", path, e);
            }
        }
    }

    async fn handle(&self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                info!("MQTT connected: {:?}", ack.code);
                self.connected.store(true, Ordering::SeqCst);
                self.subscribe_all();
            }
            Event::Incoming(Packet::SubAck(ack)) => {
                debug!("MQTT subscription {} acknowledged", ack.pkid);
            }
            Event::Incoming(Packet::Publish(publish)) => {
                match self.feeds.decode(&publish.topic, &publish.payload) {
                    Ok(message) => {
                        debug!("Received {:?} on {}", message, publish.topic);
                        if self.inbound_tx.send(message).is_err() {
                            debug!("Inbound receiver dropped, discarding message");
                        }
                    }
                    Err(e) => warn!("Dropping message on {}: {}", publish.topic, e),
                }
            }
            Event::Outgoing(Outgoing::Publish(pkid)) => {
                self.acks.lock().await.sent(pkid);
            }
            Event::Incoming(Packet::PubAck(ack)) => {
                self.acks.lock().await.acked(ack.pkid);
            }
            Event::Incoming(Packet::PingResp) => {
                debug!("MQTT ping response received");
            }
            _ => {}
        }
    }

    async fn connection_lost(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let mut acks = self.acks.lock().await;
        if acks.len() > 0 {
            warn!("Failing {} unacknowledged publishes", acks.len());
        }
        acks.fail_all(&PublishError::Disconnected);
    }
}

/// Drive the client until stopped.
async fn run_event_loop(
    mut eventloop: EventLoop,
    context: EventLoopContext,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = eventloop.poll() => match event {
                Ok(event) => context.handle(event).await,
                Err(e) => {
                    context.connection_lost().await;
                    warn!("MQTT connection error: {}. Reconnecting...", e);
                    tokio::select! {
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        _ = stop_rx.changed() => break,
                    }
                }
            },
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    context.connection_lost().await;
    info!("MQTT event loop stopped");
}

/// Parse an MQTT broker URL into (host, port, use_tls).
pub(crate) fn parse_broker_url(url: &str) -> Result<(String, u16, bool), String> {
    let (scheme, rest) = if let Some(stripped) = url.strip_prefix("mqtt://") {
        ("mqtt", stripped)
    } else if let Some(stripped) = url.strip_prefix("mqtts://") {
        ("mqtts", stripped)
    } else {
        return Err("Invalid scheme: URL must start with mqtt:// or mqtts://".to_string());
    };

    let use_tls = scheme == "mqtts";
    let default_port = if use_tls { 8883 } else { 1883 };
    let rest = rest.trim_end_matches('/');

    let (host, port) = if let Some((h, p)) = rest.rsplit_once(':') {
        let port = p
            .parse::<u16>()
            .map_err(|_| format!("Invalid port: {}", p))?;
        (h.to_string(), port)
    } else {
        (rest.to_string(), default_port)
    };

    if host.is_empty() {
        return Err("Host cannot be empty".to_string());
    }

    Ok((host, port, use_tls))
}
