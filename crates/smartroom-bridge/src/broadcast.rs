//! Real-time event fan-out.
//!
//! # Delivery
//!
//! - Events go to every subscriber connected at publish time
//! - There is no history: a subscriber that joins later sees only newer events
//! - Publishing never blocks; a subscriber that falls more than
//!   `server.broadcast_buffer` events behind skips the oldest ones

use serde::Serialize;
use tokio::sync::broadcast;

use smartroom_store::{StoredActuatorEvent, StoredSample};

/// An event pushed to real-time subscribers.
///
/// Serialized as `{"event": "newData", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum BridgeEvent {
    /// A sample was persisted.
    NewData(StoredSample),
    /// An actuator event was persisted.
    NewOutputData(StoredActuatorEvent),
}

/// Fan-out of [`BridgeEvent`]s to real-time subscribers.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<BridgeEvent>,
}

impl Broadcaster {
    /// Create a broadcaster buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }

    /// Deliver an event to every current subscriber.
    ///
    /// Returns the number of subscribers reached. Zero is not an error.
    pub fn publish(&self, event: BridgeEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Number of connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
