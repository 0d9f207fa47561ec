//! Sample aggregation with a debounce window.
//!
//! Sensor channels update independently. The aggregator keeps the latest value
//! per channel and closes the window once no update has arrived for a full
//! debounce interval. A closed window with every channel present becomes one
//! persisted sample; an incomplete window is discarded.
//!
//! # Timer handling
//!
//! Every [`observe`](Aggregator::observe) bumps a generation counter, aborts the
//! pending timer task and spawns a new one tagged with the new generation. A
//! timer only closes the window if its generation is still current when it
//! acquires the lock, so a timer that could not be aborted in time is a no-op.
//! The window is taken under the lock and the lock is released before the
//! sample is handed to the [`Gateway`].

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use smartroom_store::StoredSample;
use smartroom_types::{Channel, PartialSample, SensorReading};

use crate::gateway::Gateway;

/// What closing a window produced.
#[derive(Debug)]
pub enum FlushOutcome {
    /// A newer update superseded the timer.
    Stale,
    /// Nothing was buffered.
    Empty,
    /// The window closed without every channel; the values were discarded.
    Incomplete(Vec<Channel>),
    /// A sample was persisted and broadcast.
    Stored(StoredSample),
    /// A complete sample could not be persisted.
    Failed(smartroom_store::Error),
}

struct Window {
    buffer: PartialSample,
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

struct Inner {
    window: Mutex<Window>,
    gateway: Arc<Gateway>,
    debounce: Duration,
}

/// Debounced sample aggregator.
///
/// Cloning is cheap; clones share the same window.
#[derive(Clone)]
pub struct Aggregator {
    inner: Arc<Inner>,
}

impl Aggregator {
    /// Create an aggregator that hands complete samples to `gateway`.
    pub fn new(gateway: Arc<Gateway>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                window: Mutex::new(Window {
                    buffer: PartialSample::default(),
                    generation: 0,
                    pending: None,
                }),
                gateway,
                debounce,
            }),
        }
    }

    /// The debounce interval.
    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }

    /// Record a reading and restart the debounce window.
    pub async fn observe(&self, reading: SensorReading) {
        let mut window = self.inner.window.lock().await;

        window.buffer.record(reading);
        window.generation = window.generation.wrapping_add(1);
        let generation = window.generation;

        if let Some(handle) = window.pending.take() {
            handle.abort();
        }

        let inner = Arc::clone(&self.inner);
        window.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            inner.close(Some(generation)).await;
        }));

        debug!("Observed {} (generation {})", reading.channel(), generation);
    }

    /// Close the window now, without waiting for the timer.
    ///
    /// Used on shutdown. The same completeness rules apply.
    pub async fn flush_now(&self) -> FlushOutcome {
        self.inner.close(None).await
    }

    /// Values buffered in the open window.
    pub async fn buffered(&self) -> PartialSample {
        self.inner.window.lock().await.buffer
    }
}

impl Inner {
    /// Take the window and persist it if complete.
    ///
    /// `generation` is the timer's tag; `None` forces the close.
    async fn close(&self, generation: Option<u64>) -> FlushOutcome {
        let taken = {
            let mut window = self.window.lock().await;

            if let Some(expected) = generation
                && expected != window.generation
            {
                debug!(
                    "Ignoring stale timer (generation {}, current {})",
                    expected, window.generation
                );
                return FlushOutcome::Stale;
            }

            // A firing timer only detaches its own handle. Aborting it here
            // could cancel the persist below once the lock is released.
            if let Some(handle) = window.pending.take()
                && generation.is_none()
            {
                handle.abort();
            }

            window.buffer.take()
        };

        if taken.is_empty() {
            return FlushOutcome::Empty;
        }

        match taken.complete() {
            Ok(sample) => {
                match self
                    .gateway
                    .store_sample(sample, OffsetDateTime::now_utc())
                    .await
                {
                    Ok(stored) => {
                        info!(
                            "Sample {} stored (temperature={}, humidity={}, light={}, infrared={})",
                            stored.id,
                            stored.temperature,
                            stored.humidity,
                            stored.light_intensity,
                            stored.current_status
                        );
                        FlushOutcome::Stored(stored)
                    }
                    Err(e) => FlushOutcome::Failed(e),
                }
            }
            Err(missing) => {
                let names = missing
                    .iter()
                    .map(|c| c.feed())
                    .collect::<Vec<_>>()
                    .join(", ");
                info!("Discarding incomplete sample, missing: {}", names);
                FlushOutcome::Incomplete(missing)
            }
        }
    }
}
