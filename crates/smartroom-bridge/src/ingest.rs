//! Inbound message routing.
//!
//! Sensor readings go straight to the [`Aggregator`]; recording one only takes
//! the window lock and rearms the timer. Actuator reports are handed to a
//! dedicated worker so that a slow database write never delays sensor
//! traffic. Each path preserves the arrival order of its own messages.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use smartroom_types::{Actuator, ActuatorStatus, BusMessage};

use crate::aggregator::Aggregator;
use crate::dispatcher::Dispatcher;
use crate::gateway::Gateway;
use crate::state::AppState;

/// Routes decoded bus messages to the aggregator and the actuator worker.
pub struct Ingestor {
    aggregator: Aggregator,
    gateway: Arc<Gateway>,
    dispatcher: Arc<Dispatcher>,
}

impl Ingestor {
    /// Create an ingestor over the shared components.
    pub fn new(aggregator: Aggregator, gateway: Arc<Gateway>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            aggregator,
            gateway,
            dispatcher,
        }
    }

    /// Create an ingestor for the components held in `state`.
    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.aggregator.clone(),
            Arc::clone(&state.gateway),
            Arc::clone(&state.dispatcher),
        )
    }

    /// Run the ingestor in a background task.
    pub fn spawn(self, inbound: mpsc::UnboundedReceiver<BusMessage>) -> JoinHandle<()> {
        tokio::spawn(self.run(inbound))
    }

    /// Consume `inbound` until the sender side is dropped.
    ///
    /// Returns once every actuator report received so far has been handled.
    pub async fn run(self, mut inbound: mpsc::UnboundedReceiver<BusMessage>) {
        let (actuator_tx, actuator_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(actuator_worker(
            actuator_rx,
            Arc::clone(&self.gateway),
            Arc::clone(&self.dispatcher),
        ));

        info!("Ingestor started");

        while let Some(message) = inbound.recv().await {
            match message {
                BusMessage::Sensor(reading) => self.aggregator.observe(reading).await,
                BusMessage::Actuator { actuator, status } => {
                    if actuator_tx.send((actuator, status)).is_err() {
                        warn!("Actuator worker stopped, dropping {} report", actuator);
                    }
                }
            }
        }

        drop(actuator_tx);
        if let Err(e) = worker.await {
            warn!("Actuator worker failed: {}", e);
        }

        info!("Ingestor stopped");
    }
}

async fn actuator_worker(
    mut reports: mpsc::UnboundedReceiver<(Actuator, ActuatorStatus)>,
    gateway: Arc<Gateway>,
    dispatcher: Arc<Dispatcher>,
) {
    while let Some((actuator, status)) = reports.recv().await {
        debug!("{} reported {:?}", actuator, status);

        // The device has switched either way; a failed write only loses the log entry.
        let _ = gateway.store_actuator_event(actuator, status).await;
        dispatcher.record_actuator_status(actuator, status).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use smartroom_store::Store;
    use smartroom_types::{ActuatorState, SensorReading, Thresholds};
    use tokio::sync::Mutex;

    use crate::broadcast::{BridgeEvent, Broadcaster};
    use crate::mock::MockBus;

    const DEBOUNCE: Duration = Duration::from_millis(3000);

    struct Harness {
        ingestor: Ingestor,
        store: Arc<Mutex<Store>>,
        dispatcher: Arc<Dispatcher>,
        events: Broadcaster,
    }

    fn create_harness() -> Harness {
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        let events = Broadcaster::new(16);
        let gateway = Arc::new(Gateway::new(Arc::clone(&store), events.clone()));
        let aggregator = Aggregator::new(Arc::clone(&gateway), DEBOUNCE);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(MockBus::new()),
            Thresholds::default(),
            Duration::from_secs(10),
        ));
        Harness {
            ingestor: Ingestor::new(aggregator, gateway, Arc::clone(&dispatcher)),
            store,
            dispatcher,
            events,
        }
    }

    #[tokio::test]
    async fn test_actuator_reports_recorded_in_order() {
        let h = create_harness();
        let mut rx = h.events.subscribe();
        let (tx, inbound) = mpsc::unbounded_channel();

        tx.send(BusMessage::Actuator {
            actuator: Actuator::MiniFan,
            status: ActuatorStatus::On,
        })
        .unwrap();
        tx.send(BusMessage::Actuator {
            actuator: Actuator::MiniFan,
            status: ActuatorStatus::Off,
        })
        .unwrap();
        drop(tx);

        h.ingestor.run(inbound).await;

        let Ok(BridgeEvent::NewOutputData(first)) = rx.try_recv() else {
            panic!("expected newOutputData");
        };
        let Ok(BridgeEvent::NewOutputData(second)) = rx.try_recv() else {
            panic!("expected newOutputData");
        };
        assert_eq!(first.status, ActuatorStatus::On);
        assert_eq!(second.status, ActuatorStatus::Off);
        assert!(first.id < second.id);

        let store = h.store.lock().await;
        assert_eq!(store.count_actuator_events(Some(Actuator::MiniFan)).unwrap(), 2);
        assert_eq!(
            h.dispatcher.actuator_states().await.get(Actuator::MiniFan),
            ActuatorState::Off
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_readings_reach_aggregator() {
        let h = create_harness();
        let (tx, inbound) = mpsc::unbounded_channel();
        let task = h.ingestor.spawn(inbound);

        for reading in [
            SensorReading::Temperature(24.5),
            SensorReading::Humidity(55.0),
            SensorReading::LightIntensity(80.0),
            SensorReading::Infrared(false),
        ] {
            tx.send(BusMessage::Sensor(reading)).unwrap();
        }

        tokio::time::sleep(DEBOUNCE + Duration::from_millis(10)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        drop(tx);
        task.await.unwrap();

        let store = h.store.lock().await;
        assert_eq!(store.count_samples().unwrap(), 1);
        assert_eq!(store.count_actuator_events(None).unwrap(), 0);
    }
}
