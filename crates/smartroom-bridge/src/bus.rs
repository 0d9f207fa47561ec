//! Outbound side of the message bus.
//!
//! The control plane publishes through [`BusPublisher`], so the dispatcher can
//! run against the live MQTT client, an offline stand-in, or a mock in tests.

use std::time::Duration;

use async_trait::async_trait;
use smartroom_types::Topic;

/// Why a publish did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// No broker connection.
    #[error("Message bus is not connected")]
    Disconnected,

    /// The client or broker refused the message.
    #[error("Publish to {topic} rejected: {reason}")]
    Rejected { topic: Topic, reason: String },

    /// The broker did not acknowledge in time.
    #[error("No acknowledgement for {topic} within {}s", .timeout.as_secs())]
    Timeout { topic: Topic, timeout: Duration },

    /// Some publishes of a multi-topic command failed.
    #[error("Publish failed for {}", format_failures(.0))]
    Partial(Vec<(Topic, PublishError)>),
}

impl PublishError {
    /// Whether the failure was a missing acknowledgement.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PublishError::Timeout { .. })
    }

    /// Topics that failed.
    pub fn failed_topics(&self) -> Vec<Topic> {
        match self {
            PublishError::Disconnected => Vec::new(),
            PublishError::Rejected { topic, .. } | PublishError::Timeout { topic, .. } => {
                vec![*topic]
            }
            PublishError::Partial(failures) => failures.iter().map(|(topic, _)| *topic).collect(),
        }
    }
}

fn format_failures(failures: &[(Topic, PublishError)]) -> String {
    failures
        .iter()
        .map(|(topic, e)| format!("{} ({})", topic, e))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Publishes payloads to bus topics at QoS 1.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    /// Publish `payload` to `topic` and wait for the broker acknowledgement.
    ///
    /// Callers bound the wait; implementations may wait indefinitely.
    async fn publish(&self, topic: Topic, payload: String) -> Result<(), PublishError>;

    /// Whether a broker connection is currently established.
    fn is_connected(&self) -> bool;
}

/// Stand-in for running without a broker. Every publish fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineBus;

#[async_trait]
impl BusPublisher for OfflineBus {
    async fn publish(&self, _topic: Topic, _payload: String) -> Result<(), PublishError> {
        Err(PublishError::Disconnected)
    }

    fn is_connected(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartroom_types::{Actuator, ThresholdKind};

    #[tokio::test]
    async fn test_offline_bus_rejects() {
        let bus = OfflineBus;
        assert!(!bus.is_connected());

        let result = bus
            .publish(Topic::Actuator(Actuator::MiniFan), "1".to_string())
            .await;
        assert_eq!(result, Err(PublishError::Disconnected));
    }

    #[test]
    fn test_partial_error_lists_topics() {
        let error = PublishError::Partial(vec![
            (
                Topic::Threshold(ThresholdKind::Fan),
                PublishError::Timeout {
                    topic: Topic::Threshold(ThresholdKind::Fan),
                    timeout: Duration::from_secs(10),
                },
            ),
            (
                Topic::Threshold(ThresholdKind::Light),
                PublishError::Disconnected,
            ),
        ]);

        let display = error.to_string();
        assert!(display.contains("fan-threshold"));
        assert!(display.contains("light-threshold"));
        assert!(display.contains("10s"));
        assert_eq!(
            error.failed_topics(),
            vec![
                Topic::Threshold(ThresholdKind::Fan),
                Topic::Threshold(ThresholdKind::Light)
            ]
        );
        assert!(!error.is_timeout());
    }
}
