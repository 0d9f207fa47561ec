//! Core types for smart-room sensor channels, samples, actuators and thresholds.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// One independently updating sensor input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Channel {
    /// Air temperature in degrees Celsius.
    Temperature,
    /// Relative humidity percentage.
    Humidity,
    /// Ambient light intensity.
    LightIntensity,
    /// Infrared presence detector.
    Infrared,
}

impl Channel {
    /// Every channel a complete sample requires, in storage order.
    pub const ALL: [Channel; 4] = [
        Channel::Temperature,
        Channel::Humidity,
        Channel::LightIntensity,
        Channel::Infrared,
    ];

    /// Feed name of the channel on the bus.
    #[must_use]
    pub fn feed(&self) -> &'static str {
        match self {
            Channel::Temperature => "temperature",
            Channel::Humidity => "humidity",
            Channel::LightIntensity => "light-intensity",
            Channel::Infrared => "infrared",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.feed())
    }
}

/// A single decoded value for one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorReading {
    Temperature(f64),
    Humidity(f64),
    LightIntensity(f64),
    Infrared(bool),
}

impl SensorReading {
    /// The channel this reading belongs to.
    #[must_use]
    pub fn channel(&self) -> Channel {
        match self {
            SensorReading::Temperature(_) => Channel::Temperature,
            SensorReading::Humidity(_) => Channel::Humidity,
            SensorReading::LightIntensity(_) => Channel::LightIntensity,
            SensorReading::Infrared(_) => Channel::Infrared,
        }
    }

    /// Decode a raw payload for `channel`.
    ///
    /// Numeric channels accept any finite decimal. The infrared channel follows
    /// the device convention: `"1"` means detected, anything else means clear.
    ///
    /// # Examples
    ///
    /// ```
    /// use smartroom_types::{Channel, SensorReading};
    ///
    /// assert_eq!(
    ///     SensorReading::decode(Channel::Temperature, "24.5").unwrap(),
    ///     SensorReading::Temperature(24.5)
    /// );
    /// assert_eq!(
    ///     SensorReading::decode(Channel::Infrared, "1").unwrap(),
    ///     SensorReading::Infrared(true)
    /// );
    /// assert!(SensorReading::decode(Channel::Humidity, "wet").is_err());
    /// ```
    pub fn decode(channel: Channel, payload: &str) -> Result<Self, ParseError> {
        let payload = payload.trim();
        let number = || {
            payload
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ParseError::InvalidPayload {
                    feed: channel.feed(),
                    payload: payload.to_string(),
                })
        };

        match channel {
            Channel::Temperature => number().map(SensorReading::Temperature),
            Channel::Humidity => number().map(SensorReading::Humidity),
            Channel::LightIntensity => number().map(SensorReading::LightIntensity),
            Channel::Infrared => Ok(SensorReading::Infrared(payload == "1")),
        }
    }
}

/// A complete set of correlated channel values.
///
/// Values of this type only exist with every channel present; see
/// [`PartialSample::complete`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sample {
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity percentage.
    pub humidity: f64,
    /// Ambient light intensity.
    pub light_intensity: f64,
    /// Whether the infrared detector reported presence.
    pub current_status: bool,
}

/// Latest-seen value per channel while a sample is being assembled.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartialSample {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light_intensity: Option<f64>,
    pub infrared: Option<bool>,
}

impl PartialSample {
    /// Record a reading. A later value for the same channel replaces the earlier one.
    pub fn record(&mut self, reading: SensorReading) {
        match reading {
            SensorReading::Temperature(v) => self.temperature = Some(v),
            SensorReading::Humidity(v) => self.humidity = Some(v),
            SensorReading::LightIntensity(v) => self.light_intensity = Some(v),
            SensorReading::Infrared(v) => self.infrared = Some(v),
        }
    }

    /// Take the buffered values, leaving every channel empty.
    pub fn take(&mut self) -> PartialSample {
        std::mem::take(self)
    }

    /// Whether no channel has been observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missing().len() == Channel::ALL.len()
    }

    /// Channels that have not been observed yet.
    #[must_use]
    pub fn missing(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|channel| match channel {
                Channel::Temperature => self.temperature.is_none(),
                Channel::Humidity => self.humidity.is_none(),
                Channel::LightIntensity => self.light_intensity.is_none(),
                Channel::Infrared => self.infrared.is_none(),
            })
            .collect()
    }

    /// Promote to a [`Sample`] if every channel is present.
    ///
    /// # Errors
    ///
    /// Returns the list of missing channels otherwise.
    pub fn complete(&self) -> Result<Sample, Vec<Channel>> {
        match (
            self.temperature,
            self.humidity,
            self.light_intensity,
            self.infrared,
        ) {
            (Some(temperature), Some(humidity), Some(light_intensity), Some(current_status)) => {
                Ok(Sample {
                    temperature,
                    humidity,
                    light_intensity,
                    current_status,
                })
            }
            _ => Err(self.missing()),
        }
    }
}

/// A controllable output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Actuator {
    /// The 4-LED RGB light strip.
    #[cfg_attr(feature = "serde", serde(rename = "rgb_led"))]
    RgbLight,
    /// The mini fan.
    #[cfg_attr(feature = "serde", serde(rename = "minifan"))]
    MiniFan,
    /// The on-device automation mode switch.
    #[cfg_attr(feature = "serde", serde(rename = "auto"))]
    Automation,
}

impl Actuator {
    /// All actuators.
    pub const ALL: [Actuator; 3] = [Actuator::RgbLight, Actuator::MiniFan, Actuator::Automation];

    /// Feed name of the actuator on the bus.
    #[must_use]
    pub fn feed(&self) -> &'static str {
        match self {
            Actuator::RgbLight => "4-led-rgb-light",
            Actuator::MiniFan => "mini-fan",
            Actuator::Automation => "automation",
        }
    }

    /// Stored kind, as written to the event log.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Actuator::RgbLight => "rgb_led",
            Actuator::MiniFan => "minifan",
            Actuator::Automation => "auto",
        }
    }

    /// Resolve a device name from the control API.
    ///
    /// Accepts both the stored kind (`minifan`) and the feed name (`mini-fan`).
    ///
    /// # Examples
    ///
    /// ```
    /// use smartroom_types::Actuator;
    ///
    /// assert_eq!(Actuator::from_name("mini-fan"), Ok(Actuator::MiniFan));
    /// assert_eq!(Actuator::from_name("minifan"), Ok(Actuator::MiniFan));
    /// assert_eq!(Actuator::from_name("automation"), Ok(Actuator::Automation));
    /// assert!(Actuator::from_name("heater").is_err());
    /// ```
    pub fn from_name(name: &str) -> Result<Self, ParseError> {
        match name {
            "rgb_led" | "4-led-rgb-light" => Ok(Actuator::RgbLight),
            "minifan" | "mini-fan" => Ok(Actuator::MiniFan),
            "auto" | "automation" => Ok(Actuator::Automation),
            other => Err(ParseError::UnknownActuator(other.to_string())),
        }
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two-valued actuator status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActuatorStatus {
    Off,
    On,
}

impl ActuatorStatus {
    /// Decode a bus payload: `"1"` is on, anything else is off.
    #[must_use]
    pub fn from_payload(payload: &str) -> Self {
        if payload.trim() == "1" {
            ActuatorStatus::On
        } else {
            ActuatorStatus::Off
        }
    }

    /// Convert a 0/1 level. Other values are rejected.
    #[must_use]
    pub fn from_level(level: i64) -> Option<Self> {
        match level {
            0 => Some(ActuatorStatus::Off),
            1 => Some(ActuatorStatus::On),
            _ => None,
        }
    }

    /// Payload sent on the bus.
    #[must_use]
    pub fn as_payload(&self) -> &'static str {
        match self {
            ActuatorStatus::Off => "0",
            ActuatorStatus::On => "1",
        }
    }

    /// Numeric level as stored.
    #[must_use]
    pub fn level(&self) -> u8 {
        match self {
            ActuatorStatus::Off => 0,
            ActuatorStatus::On => 1,
        }
    }
}

#[cfg(feature = "serde")]
impl Serialize for ActuatorStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.level())
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for ActuatorStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let level = i64::deserialize(deserializer)?;
        ActuatorStatus::from_level(level)
            .ok_or_else(|| serde::de::Error::custom(format!("status must be 0 or 1, got {level}")))
    }
}

/// Last known state of one actuator.
///
/// Starts `Unknown` and becomes `Off` or `On` on the first observed or commanded
/// status. There are no transitional states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ActuatorState {
    #[default]
    Unknown,
    Off,
    On,
}

impl From<ActuatorStatus> for ActuatorState {
    fn from(status: ActuatorStatus) -> Self {
        match status {
            ActuatorStatus::Off => ActuatorState::Off,
            ActuatorStatus::On => ActuatorState::On,
        }
    }
}

/// Current state of every actuator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActuatorStates {
    pub rgb_led: ActuatorState,
    pub minifan: ActuatorState,
    pub auto: ActuatorState,
}

impl ActuatorStates {
    /// State of a single actuator.
    #[must_use]
    pub fn get(&self, actuator: Actuator) -> ActuatorState {
        match actuator {
            Actuator::RgbLight => self.rgb_led,
            Actuator::MiniFan => self.minifan,
            Actuator::Automation => self.auto,
        }
    }

    /// Apply an accepted status and return the previous state.
    pub fn apply(&mut self, actuator: Actuator, status: ActuatorStatus) -> ActuatorState {
        let slot = match actuator {
            Actuator::RgbLight => &mut self.rgb_led,
            Actuator::MiniFan => &mut self.minifan,
            Actuator::Automation => &mut self.auto,
        };
        std::mem::replace(slot, status.into())
    }
}

/// A tunable control threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ThresholdKind {
    /// Temperature above which the fan turns on.
    Fan,
    /// Light level below which the light turns on.
    Light,
}

impl ThresholdKind {
    pub const ALL: [ThresholdKind; 2] = [ThresholdKind::Fan, ThresholdKind::Light];

    /// Feed name the threshold is published to.
    #[must_use]
    pub fn feed(&self) -> &'static str {
        match self {
            ThresholdKind::Fan => "fan-threshold",
            ThresholdKind::Light => "light-threshold",
        }
    }
}

/// Default fan threshold (degrees Celsius).
pub const DEFAULT_FAN_THRESHOLD: f64 = 30.0;
/// Default light threshold.
pub const DEFAULT_LIGHT_THRESHOLD: f64 = 200.0;

/// The current pair of control thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Thresholds {
    pub fan: f64,
    pub light: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            fan: DEFAULT_FAN_THRESHOLD,
            light: DEFAULT_LIGHT_THRESHOLD,
        }
    }
}

impl Thresholds {
    /// Value of a single threshold.
    #[must_use]
    pub fn get(&self, kind: ThresholdKind) -> f64 {
        match kind {
            ThresholdKind::Fan => self.fan,
            ThresholdKind::Light => self.light,
        }
    }

    /// Payload published for a threshold.
    ///
    /// Whole numbers are sent without a fractional part (`25`, not `25.0`).
    #[must_use]
    pub fn payload(&self, kind: ThresholdKind) -> String {
        let value = self.get(kind);
        if value.fract() == 0.0 && value.abs() < 1e15 {
            format!("{}", value as i64)
        } else {
            value.to_string()
        }
    }
}
