//! Application state shared across handlers.
//!
//! # Broadcast Channel Behavior
//!
//! [`AppState::events`] fans stored records out to WebSocket clients:
//!
//! - **Buffer size**: Configurable via `server.broadcast_buffer` (default: 100)
//! - **Message loss**: A subscriber that falls behind a full buffer misses the oldest events
//! - **No blocking**: The gateway never waits for slow subscribers
//!
//! ## Example Configuration
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:3000"
//! broadcast_buffer = 200  # Larger buffer for slow clients
//! ```

use std::sync::Arc;

use smartroom_store::Store;
use tokio::sync::Mutex;
use tracing::info;

use smartroom_types::Actuator;

use crate::aggregator::Aggregator;
use crate::broadcast::Broadcaster;
use crate::bus::BusPublisher;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::gateway::Gateway;

/// Shared application state.
pub struct AppState {
    /// The data store, shared with the gateway.
    pub store: Arc<Mutex<Store>>,
    /// Real-time event fan-out.
    pub events: Broadcaster,
    /// Persistence gateway.
    pub gateway: Arc<Gateway>,
    /// Sample aggregator.
    pub aggregator: Aggregator,
    /// Command dispatcher.
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Wire up the bridge components around `store` and `bus`.
    pub fn new(store: Store, config: Config, bus: Arc<dyn BusPublisher>) -> Arc<Self> {
        let store = Arc::new(Mutex::new(store));
        let events = Broadcaster::new(config.server.broadcast_buffer);
        let gateway = Arc::new(Gateway::new(Arc::clone(&store), events.clone()));
        let aggregator = Aggregator::new(Arc::clone(&gateway), config.aggregator.debounce());
        let dispatcher = Arc::new(Dispatcher::new(
            bus,
            config.thresholds.thresholds(),
            config.mqtt.ack_timeout(),
        ));

        Arc::new(Self {
            store,
            events,
            gateway,
            aggregator,
            dispatcher,
        })
    }

    /// Restore actuator states from the latest persisted event of each actuator.
    pub async fn seed_actuator_states(&self) -> Result<(), smartroom_store::Error> {
        let latest = {
            let store = self.store.lock().await;
            Actuator::ALL
                .into_iter()
                .map(|actuator| store.latest_actuator_event(actuator))
                .collect::<Result<Vec<_>, _>>()?
        };

        for event in latest.into_iter().flatten() {
            info!("Restored {} state {:?}", event.actuator, event.status);
            self.dispatcher
                .record_actuator_status(event.actuator, event.status)
                .await;
        }

        Ok(())
    }
}
