//! Mock bus for testing.
//!
//! [`MockBus`] implements [`BusPublisher`] without a broker, so the dispatcher
//! and the HTTP layer can be exercised in unit and integration tests.
//!
//! # Features
//!
//! - **Recording**: Every acknowledged publish is kept in order
//! - **Failure injection**: Fail publishes to specific topics, or drop the connection
//! - **Latency simulation**: Delay acknowledgements to exercise timeouts

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use smartroom_types::Topic;

use crate::bus::{BusPublisher, PublishError};

/// A mock message bus.
///
/// # Example
///
/// ```
/// use smartroom_bridge::{BusPublisher, MockBus};
/// use smartroom_types::{Actuator, Topic};
///
/// #[tokio::main]
/// async fn main() {
///     let bus = MockBus::new();
///     bus.publish(Topic::Actuator(Actuator::MiniFan), "1".to_string())
///         .await
///         .unwrap();
///
///     assert_eq!(
///         bus.published().await,
///         vec![(Topic::Actuator(Actuator::MiniFan), "1".to_string())]
///     );
/// }
/// ```
pub struct MockBus {
    connected: AtomicBool,
    published: RwLock<Vec<(Topic, String)>>,
    failures: RwLock<HashMap<Topic, PublishError>>,
    /// Simulated acknowledgement latency in milliseconds (0 = immediate).
    ack_latency_ms: AtomicU64,
    publish_count: AtomicU32,
}

impl std::fmt::Debug for MockBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBus")
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .field("publish_count", &self.publish_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBus {
    /// Create a connected mock bus.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            published: RwLock::new(Vec::new()),
            failures: RwLock::new(HashMap::new()),
            ack_latency_ms: AtomicU64::new(0),
            publish_count: AtomicU32::new(0),
        }
    }

    /// Simulate losing or regaining the broker connection.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    /// Fail every publish to `topic` with `error`.
    pub async fn fail_topic(&self, topic: Topic, error: PublishError) {
        self.failures.write().await.insert(topic, error);
    }

    /// Remove all injected failures.
    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Delay every acknowledgement.
    pub fn set_ack_latency(&self, latency: Duration) {
        self.ack_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Acknowledged publishes, in order.
    pub async fn published(&self) -> Vec<(Topic, String)> {
        self.published.read().await.clone()
    }

    /// Number of publish attempts, including failed ones.
    pub fn publish_count(&self) -> u32 {
        self.publish_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BusPublisher for MockBus {
    async fn publish(&self, topic: Topic, payload: String) -> Result<(), PublishError> {
        self.publish_count.fetch_add(1, Ordering::Relaxed);

        if !self.is_connected() {
            return Err(PublishError::Disconnected);
        }

        let latency = self.ack_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if let Some(error) = self.failures.read().await.get(&topic) {
            return Err(error.clone());
        }

        self.published.write().await.push((topic, payload));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
