//! Error types for decoding bus traffic in smartroom-types.

use thiserror::Error;

/// Errors that can occur when translating bus topics and payloads into typed values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The feed name is not part of the closed topic set.
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// The device name is not one of the known actuators.
    #[error("Invalid device: {0}")]
    UnknownActuator(String),

    /// The payload could not be decoded for the given feed.
    #[error("Invalid payload for {feed}: {payload:?}")]
    InvalidPayload { feed: &'static str, payload: String },

    /// The feed is publish-only and never carries inbound data.
    #[error("Topic {0} is outbound only")]
    OutboundOnly(&'static str),
}
