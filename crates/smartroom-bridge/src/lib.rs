//! MQTT telemetry bridge and HTTP control plane for a smart room.
//!
//! This crate provides a service that:
//! - Subscribes to the room's sensor and actuator feeds on an MQTT broker
//! - Correlates independently arriving sensor values into complete samples
//! - Stores samples and actuator events in the local database
//! - Pushes every stored record to WebSocket clients
//! - Forwards actuator commands and threshold updates to the broker, waiting
//!   for the broker acknowledgement
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/latest-data` - Latest complete sample
//! - `POST /api/output/{device}` - Switch an actuator
//! - `GET /api/output` - Actuator states
//! - `GET /api/thresholds` / `POST /api/thresholds` - Control thresholds
//! - `GET /api/activity` - Paginated activity log
//! - `WS /api/ws` - Real-time record stream
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/smartroom/bridge.toml`:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:3000"
//!
//! [storage]
//! path = "~/.local/share/smartroom/data.db"
//!
//! [mqtt]
//! broker = "mqtts://io.adafruit.com"
//! username = "alice"
//! # or SMARTROOM_MQTT_PASSWORD in the environment
//! password = "aio_xxxx"
//!
//! [aggregator]
//! debounce_ms = 3000
//!
//! [thresholds]
//! fan = 30
//! light = 200
//! ```

pub mod aggregator;
pub mod api;
pub mod broadcast;
pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod gateway;
pub mod ingest;
pub mod mock;
pub mod mqtt;
pub mod state;
pub mod ws;

pub use aggregator::{Aggregator, FlushOutcome};
pub use broadcast::{BridgeEvent, Broadcaster};
pub use bus::{BusPublisher, OfflineBus, PublishError};
pub use config::{
    AggregatorConfig, Config, ConfigError, MqttConfig, ServerConfig, StorageConfig,
    ThresholdConfig,
};
pub use dispatcher::{CommandError, Dispatcher};
pub use gateway::Gateway;
pub use ingest::Ingestor;
pub use mock::MockBus;
pub use mqtt::{MqttBus, MqttError};
pub use state::AppState;
