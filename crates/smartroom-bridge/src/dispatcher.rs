//! Command dispatcher.
//!
//! Validates actuator and threshold commands from the control plane and
//! forwards them onto the bus. Each publish waits for the broker
//! acknowledgement up to the configured timeout, so the caller learns whether
//! the command reached the broker.
//!
//! Accepting a command does not record an actuator event. The device echoes
//! its new status on the actuator topic, and that message is recorded
//! separately by the ingestion path.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use smartroom_types::{
    Actuator, ActuatorState, ActuatorStates, ActuatorStatus, ThresholdKind, Thresholds, Topic,
};

use crate::bus::{BusPublisher, PublishError};

/// Why a command was refused or failed.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The device is not one of the known actuators. Nothing was published.
    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    /// The command arguments are malformed. Nothing was published.
    #[error("{0}")]
    Validation(String),

    /// The command was valid but did not reach the broker.
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Forwards validated commands to the bus and tracks control state.
pub struct Dispatcher {
    bus: Arc<dyn BusPublisher>,
    thresholds: RwLock<Thresholds>,
    /// Held for a whole threshold update, publishes included.
    threshold_update: Mutex<()>,
    actuators: RwLock<ActuatorStates>,
    ack_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher publishing through `bus`.
    pub fn new(bus: Arc<dyn BusPublisher>, thresholds: Thresholds, ack_timeout: Duration) -> Self {
        Self {
            bus,
            thresholds: RwLock::new(thresholds),
            threshold_update: Mutex::new(()),
            actuators: RwLock::new(ActuatorStates::default()),
            ack_timeout,
        }
    }

    /// Whether the bus is connected.
    pub fn bus_connected(&self) -> bool {
        self.bus.is_connected()
    }

    /// Switch an actuator on or off.
    ///
    /// `device` accepts the feed names (`mini-fan`) and the stored kinds
    /// (`minifan`). `status` must be `0` or `1`, as a number or a string.
    ///
    /// # Errors
    ///
    /// - [`CommandError::InvalidDevice`] for an unknown device, before any publish
    /// - [`CommandError::Validation`] for any other status value
    /// - [`CommandError::Publish`] if the broker did not acknowledge
    pub async fn set_actuator(
        &self,
        device: &str,
        status: &Value,
    ) -> Result<ActuatorStatus, CommandError> {
        let actuator = Actuator::from_name(device)
            .map_err(|_| CommandError::InvalidDevice(device.to_string()))?;
        let status = parse_status(status)?;

        self.publish(Topic::Actuator(actuator), status.as_payload().to_string())
            .await?;

        let previous = self.actuators.write().await.apply(actuator, status);
        info!(
            "{} commanded {:?} -> {:?}",
            actuator,
            previous,
            ActuatorState::from(status)
        );

        Ok(status)
    }

    /// Replace both thresholds and publish them.
    ///
    /// Both values are published on every accepted update, each to its own
    /// topic and concurrently, so a retry after a failure republishes the
    /// pair. Updates run one at a time: the broker receives them in the
    /// order they were swapped in. A failed publish is not rolled back: the
    /// new pair stays in force and every failed topic is reported in
    /// [`PublishError::Partial`].
    pub async fn set_thresholds(&self, value: &Value) -> Result<Thresholds, CommandError> {
        let next = Thresholds {
            fan: number_field(value, "fan")?,
            light: number_field(value, "light")?,
        };

        let _update = self.threshold_update.lock().await;
        *self.thresholds.write().await = next;

        let results = join_all(
            ThresholdKind::ALL
                .iter()
                .map(|kind| self.publish(Topic::Threshold(*kind), next.payload(*kind))),
        )
        .await;

        let failures: Vec<(Topic, PublishError)> = ThresholdKind::ALL
            .into_iter()
            .zip(results)
            .filter_map(|(kind, result)| result.err().map(|e| (Topic::Threshold(kind), e)))
            .collect();

        if failures.is_empty() {
            info!("Thresholds updated: fan={}, light={}", next.fan, next.light);
            Ok(next)
        } else {
            let error = PublishError::Partial(failures);
            warn!("Thresholds updated locally but not fully published: {}", error);
            Err(error.into())
        }
    }

    /// The current threshold pair.
    pub async fn thresholds(&self) -> Thresholds {
        *self.thresholds.read().await
    }

    /// Last known state of every actuator.
    pub async fn actuator_states(&self) -> ActuatorStates {
        *self.actuators.read().await
    }

    /// Record a status reported by a device (or restored from storage).
    pub async fn record_actuator_status(&self, actuator: Actuator, status: ActuatorStatus) {
        self.actuators.write().await.apply(actuator, status);
    }

    async fn publish(&self, topic: Topic, payload: String) -> Result<(), PublishError> {
        match tokio::time::timeout(self.ack_timeout, self.bus.publish(topic, payload)).await {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout {
                topic,
                timeout: self.ack_timeout,
            }),
        }
    }
}

fn parse_status(value: &Value) -> Result<ActuatorStatus, CommandError> {
    let level = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    level
        .and_then(ActuatorStatus::from_level)
        .ok_or_else(|| CommandError::Validation(format!("status must be 0 or 1, got {}", value)))
}

fn number_field(value: &Value, name: &str) -> Result<f64, CommandError> {
    value
        .get(name)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .ok_or_else(|| CommandError::Validation("Invalid values".to_string()))
}
