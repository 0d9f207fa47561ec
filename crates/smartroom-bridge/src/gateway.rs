//! Persistence gateway.
//!
//! Writes samples and actuator events to the store and, once a write has
//! returned, announces the stored record to real-time subscribers. Failed
//! writes are logged and returned; nothing is retried and nothing is announced.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, error};

use smartroom_store::{Store, StoredActuatorEvent, StoredSample};
use smartroom_types::{Actuator, ActuatorStatus, Sample};

use crate::broadcast::{BridgeEvent, Broadcaster};

/// Writes records and announces them.
pub struct Gateway {
    store: Arc<Mutex<Store>>,
    events: Broadcaster,
}

impl Gateway {
    /// Create a gateway over a shared store.
    pub fn new(store: Arc<Mutex<Store>>, events: Broadcaster) -> Self {
        Self { store, events }
    }

    /// Persist a complete sample, then broadcast `newData`.
    pub async fn store_sample(
        &self,
        sample: Sample,
        captured_at: OffsetDateTime,
    ) -> Result<StoredSample, smartroom_store::Error> {
        let result = {
            let store = self.store.lock().await;
            store.insert_sample(&sample, captured_at)
        };

        match result {
            Ok(stored) => {
                let receivers = self.events.publish(BridgeEvent::NewData(stored.clone()));
                debug!(
                    "Sample {} stored, announced to {} subscribers",
                    stored.id, receivers
                );
                Ok(stored)
            }
            Err(e) => {
                error!("Failed to store sample: {}", e);
                Err(e)
            }
        }
    }

    /// Persist an actuator state change, then broadcast `newOutputData`.
    pub async fn store_actuator_event(
        &self,
        actuator: Actuator,
        status: ActuatorStatus,
    ) -> Result<StoredActuatorEvent, smartroom_store::Error> {
        let result = {
            let store = self.store.lock().await;
            store.insert_actuator_event(actuator, status, OffsetDateTime::now_utc())
        };

        match result {
            Ok(stored) => {
                let receivers = self
                    .events
                    .publish(BridgeEvent::NewOutputData(stored.clone()));
                debug!(
                    "{} event {} stored, announced to {} subscribers",
                    actuator, stored.id, receivers
                );
                Ok(stored)
            }
            Err(e) => {
                error!("Failed to store {} event: {}", actuator, e);
                Err(e)
            }
        }
    }
}
