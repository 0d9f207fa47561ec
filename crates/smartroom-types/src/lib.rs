//! Closed vocabularies for the smart-room telemetry bridge.
//!
//! This crate holds the types shared by the store and the bridge service:
//!
//! - Sensor channels and decoded readings
//! - Partial and complete samples
//! - Actuators, their two-valued status and per-actuator state
//! - Control thresholds
//! - The bus topic set and typed inbound messages
//!
//! All feed names and payload strings are translated here, so that the rest of
//! the workspace never compares raw strings.
//!
//! # Example
//!
//! ```
//! use smartroom_types::{BusMessage, SensorReading, Topic};
//!
//! let topic = Topic::from_feed("temperature")?;
//! let message = BusMessage::decode(topic, "24.5")?;
//! assert_eq!(message, BusMessage::Sensor(SensorReading::Temperature(24.5)));
//! # Ok::<(), smartroom_types::ParseError>(())
//! ```

pub mod error;
pub mod topic;
pub mod types;

pub use error::ParseError;
pub use topic::{BusMessage, Topic};
pub use types::{
    Actuator, ActuatorState, ActuatorStates, ActuatorStatus, Channel, PartialSample, Sample,
    SensorReading, ThresholdKind, Thresholds,
};
