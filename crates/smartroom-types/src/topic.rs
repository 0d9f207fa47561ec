//! The closed set of bus topics and the typed messages they carry.
//!
//! Every string comparison against feed names and payloads happens here; the
//! rest of the workspace only sees [`Topic`] and [`BusMessage`].

use core::fmt;

use crate::error::ParseError;
use crate::types::{Actuator, ActuatorStatus, Channel, SensorReading, ThresholdKind};

/// A logical bus topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Inbound sensor channel.
    Sensor(Channel),
    /// Inbound and outbound actuator state.
    Actuator(Actuator),
    /// Outbound-only control threshold.
    Threshold(ThresholdKind),
}

impl Topic {
    /// Topics the bridge subscribes to.
    pub const INBOUND: [Topic; 7] = [
        Topic::Sensor(Channel::Temperature),
        Topic::Sensor(Channel::Humidity),
        Topic::Sensor(Channel::LightIntensity),
        Topic::Sensor(Channel::Infrared),
        Topic::Actuator(Actuator::RgbLight),
        Topic::Actuator(Actuator::MiniFan),
        Topic::Actuator(Actuator::Automation),
    ];

    /// Feed name of the topic, without any organization prefix.
    #[must_use]
    pub fn feed(&self) -> &'static str {
        match self {
            Topic::Sensor(channel) => channel.feed(),
            Topic::Actuator(actuator) => actuator.feed(),
            Topic::Threshold(kind) => kind.feed(),
        }
    }

    /// Resolve a bare feed name.
    ///
    /// # Examples
    ///
    /// ```
    /// use smartroom_types::{Actuator, Channel, Topic};
    ///
    /// assert_eq!(Topic::from_feed("light-intensity"), Ok(Topic::Sensor(Channel::LightIntensity)));
    /// assert_eq!(Topic::from_feed("mini-fan"), Ok(Topic::Actuator(Actuator::MiniFan)));
    /// assert!(Topic::from_feed("pressure").is_err());
    /// ```
    pub fn from_feed(feed: &str) -> Result<Self, ParseError> {
        let topic = match feed {
            "temperature" => Topic::Sensor(Channel::Temperature),
            "humidity" => Topic::Sensor(Channel::Humidity),
            "light-intensity" => Topic::Sensor(Channel::LightIntensity),
            "infrared" => Topic::Sensor(Channel::Infrared),
            "4-led-rgb-light" => Topic::Actuator(Actuator::RgbLight),
            "mini-fan" => Topic::Actuator(Actuator::MiniFan),
            "automation" => Topic::Actuator(Actuator::Automation),
            "fan-threshold" => Topic::Threshold(ThresholdKind::Fan),
            "light-threshold" => Topic::Threshold(ThresholdKind::Light),
            other => return Err(ParseError::UnknownTopic(other.to_string())),
        };
        Ok(topic)
    }

    /// Whether the bridge expects inbound traffic on this topic.
    #[must_use]
    pub fn is_inbound(&self) -> bool {
        !matches!(self, Topic::Threshold(_))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.feed())
    }
}

/// A decoded inbound bus message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BusMessage {
    /// A new value for one sensor channel.
    Sensor(SensorReading),
    /// An actuator reported (or was set to) a new status.
    Actuator {
        actuator: Actuator,
        status: ActuatorStatus,
    },
}

impl BusMessage {
    /// Decode a payload received on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::OutboundOnly`] for threshold topics and
    /// [`ParseError::InvalidPayload`] for undecodable sensor values.
    pub fn decode(topic: Topic, payload: &str) -> Result<Self, ParseError> {
        match topic {
            Topic::Sensor(channel) => SensorReading::decode(channel, payload).map(BusMessage::Sensor),
            Topic::Actuator(actuator) => Ok(BusMessage::Actuator {
                actuator,
                status: ActuatorStatus::from_payload(payload),
            }),
            Topic::Threshold(kind) => Err(ParseError::OutboundOnly(kind.feed())),
        }
    }

    /// The topic this message arrived on.
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            BusMessage::Sensor(reading) => Topic::Sensor(reading.channel()),
            BusMessage::Actuator { actuator, .. } => Topic::Actuator(*actuator),
        }
    }
}
