//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use smartroom_types::{Actuator, ActuatorStatus, Sample};

/// A persisted sample.
///
/// Serialized with the field names the real-time channel and REST layer use
/// (`input_device_id`, `timestamps`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSample {
    /// Generated input-reading ID.
    #[serde(rename = "input_device_id")]
    pub id: i64,
    /// When the debounce window closed.
    #[serde(rename = "timestamps", with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity percentage.
    pub humidity: f64,
    /// Ambient light intensity.
    pub light_intensity: f64,
    /// Infrared presence flag.
    pub current_status: bool,
}

impl StoredSample {
    /// Combine a sample with its generated ID and capture time.
    pub fn new(id: i64, captured_at: OffsetDateTime, sample: &Sample) -> Self {
        Self {
            id,
            captured_at,
            temperature: sample.temperature,
            humidity: sample.humidity,
            light_intensity: sample.light_intensity,
            current_status: sample.current_status,
        }
    }

    /// The channel values without persistence metadata.
    pub fn sample(&self) -> Sample {
        Sample {
            temperature: self.temperature,
            humidity: self.humidity,
            light_intensity: self.light_intensity,
            current_status: self.current_status,
        }
    }
}

/// A persisted actuator state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredActuatorEvent {
    /// Generated output-event ID.
    pub id: i64,
    /// When the event was recorded.
    #[serde(rename = "timestamps", with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
    /// Which actuator changed.
    #[serde(rename = "type")]
    pub actuator: Actuator,
    /// New status (0 or 1).
    pub status: ActuatorStatus,
}

/// One row of the combined activity log.
///
/// Sensor rows carry the channel columns; actuator rows carry `type` and
/// `status`. The other group is `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Row ID in its own table.
    pub log_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamps: OffsetDateTime,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light_intensity: Option<f64>,
    pub current_status: Option<bool>,
    #[serde(rename = "type")]
    pub actuator: Option<Actuator>,
    pub status: Option<ActuatorStatus>,
}

impl ActivityEntry {
    /// Whether this row is a sensor sample.
    pub fn is_sample(&self) -> bool {
        self.actuator.is_none()
    }
}

/// One page of the activity log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPage {
    pub data: Vec<ActivityEntry>,
    /// 1-based page number.
    pub page: u32,
    pub total_pages: u64,
    pub total_records: u64,
}
