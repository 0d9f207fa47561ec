//! End-to-end tests: raw bus publishes in, stored records and broadcasts out.
//!
//! The MQTT event loop is replaced by feeding decoded messages straight into
//! the ingestor; the bus is a [`MockBus`]. Time is paused so the debounce
//! window can be stepped deterministically.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use tower::ServiceExt;

use smartroom_bridge::mqtt::FeedNames;
use smartroom_bridge::{
    AppState, BridgeEvent, CommandError, Config, Ingestor, MockBus, api,
};
use smartroom_types::{Actuator, ActuatorState, ActuatorStatus, BusMessage, ThresholdKind, Topic};

const DEBOUNCE: Duration = Duration::from_millis(3000);

struct Bridge {
    state: Arc<AppState>,
    bus: Arc<MockBus>,
    feeds: FeedNames,
    inbound: mpsc::UnboundedSender<BusMessage>,
    events: broadcast::Receiver<BridgeEvent>,
}

impl Bridge {
    fn start() -> Self {
        let store = smartroom_store::Store::open_in_memory().unwrap();
        let bus = Arc::new(MockBus::new());
        let state = AppState::new(store, Config::default(), bus.clone());
        let events = state.events.subscribe();

        let (inbound, rx) = mpsc::unbounded_channel();
        Ingestor::from_state(&state).spawn(rx);

        Self {
            state,
            bus,
            feeds: FeedNames::new("alice/feeds"),
            inbound,
            events,
        }
    }

    /// Deliver a publish as the broker would.
    fn deliver(&self, feed: &str, payload: &str) {
        let message = self
            .feeds
            .decode(&format!("alice/feeds/{}", feed), payload.as_bytes())
            .unwrap();
        self.inbound.send(message).unwrap();
    }

    async fn request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = api::router()
            .with_state(Arc::clone(&self.state))
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn sample_count(&self) -> u64 {
        self.state.store.lock().await.count_samples().unwrap()
    }
}

/// Advance the paused clock; background tasks run to idle first.
async fn elapse(duration: Duration) {
    tokio::time::sleep(duration).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

const FULL_SAMPLE: [(&str, &str); 4] = [
    ("temperature", "24.5"),
    ("humidity", "55"),
    ("light-intensity", "80"),
    ("infrared", "1"),
];

#[tokio::test(start_paused = true)]
async fn complete_sample_is_stored_and_broadcast_once_in_any_order() {
    let orders: [[usize; 4]; 4] = [[0, 1, 2, 3], [3, 2, 1, 0], [2, 0, 3, 1], [1, 3, 0, 2]];

    for order in orders {
        let mut bridge = Bridge::start();
        for index in order {
            let (feed, payload) = FULL_SAMPLE[index];
            bridge.deliver(feed, payload);
        }

        elapse(DEBOUNCE + Duration::from_millis(50)).await;

        let event = bridge.events.try_recv().unwrap();
        let BridgeEvent::NewData(sample) = event else {
            panic!("expected newData, got {:?}", event);
        };
        assert_eq!(sample.temperature, 24.5);
        assert_eq!(sample.humidity, 55.0);
        assert_eq!(sample.light_intensity, 80.0);
        assert!(sample.current_status);

        assert!(bridge.events.try_recv().is_err(), "order {:?}", order);
        assert_eq!(bridge.sample_count().await, 1);

        let (status, latest) = bridge.request(get("/api/latest-data")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(latest["input_device_id"], sample.id);
    }
}

#[tokio::test(start_paused = true)]
async fn last_value_per_channel_wins() {
    let mut bridge = Bridge::start();
    bridge.deliver("temperature", "20");
    for (feed, payload) in FULL_SAMPLE {
        bridge.deliver(feed, payload);
    }
    bridge.deliver("infrared", "0");
    bridge.deliver("humidity", "61.5");

    elapse(DEBOUNCE + Duration::from_millis(50)).await;

    let Ok(BridgeEvent::NewData(sample)) = bridge.events.try_recv() else {
        panic!("expected a stored sample");
    };
    assert_eq!(sample.temperature, 24.5);
    assert_eq!(sample.humidity, 61.5);
    assert!(!sample.current_status);
}

#[tokio::test(start_paused = true)]
async fn partial_sample_is_discarded() {
    let mut bridge = Bridge::start();
    bridge.deliver("temperature", "24.5");
    bridge.deliver("humidity", "55");

    elapse(DEBOUNCE * 2).await;

    assert!(bridge.events.try_recv().is_err());
    assert_eq!(bridge.sample_count().await, 0);

    let (_, latest) = bridge.request(get("/api/latest-data")).await;
    assert_eq!(latest, json!({}));
}

#[tokio::test(start_paused = true)]
async fn window_restarts_on_every_update() {
    let mut bridge = Bridge::start();
    for (feed, payload) in FULL_SAMPLE {
        bridge.deliver(feed, payload);
    }

    // Keep the window open past several debounce intervals
    for _ in 0..5 {
        elapse(DEBOUNCE - Duration::from_millis(500)).await;
        bridge.deliver("light-intensity", "81");
    }
    assert!(bridge.events.try_recv().is_err());
    assert_eq!(bridge.sample_count().await, 0);

    elapse(DEBOUNCE + Duration::from_millis(50)).await;

    let Ok(BridgeEvent::NewData(sample)) = bridge.events.try_recv() else {
        panic!("expected a stored sample");
    };
    assert_eq!(sample.light_intensity, 81.0);
    assert!(bridge.events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn undecodable_payload_does_not_affect_next_sample() {
    let mut bridge = Bridge::start();

    assert!(
        bridge
            .feeds
            .decode("alice/feeds/temperature", b"warm")
            .is_err()
    );
    assert!(
        bridge
            .feeds
            .decode("alice/feeds/pressure", b"1013")
            .is_err()
    );

    for (feed, payload) in FULL_SAMPLE {
        bridge.deliver(feed, payload);
    }
    elapse(DEBOUNCE + Duration::from_millis(50)).await;

    assert!(matches!(
        bridge.events.try_recv(),
        Ok(BridgeEvent::NewData(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn thresholds_read_back_after_update() {
    let bridge = Bridge::start();

    let (status, body) = bridge
        .request(post_json("/api/thresholds", json!({"fan": 25, "light": 60})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = bridge.request(get("/api/thresholds")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fan"].as_f64(), Some(25.0));
    assert_eq!(body["light"].as_f64(), Some(60.0));
    assert_eq!(body.as_object().unwrap().len(), 2);

    let mut published = bridge.bus.published().await;
    published.sort_by_key(|(topic, _)| topic.feed());
    assert_eq!(
        published,
        vec![
            (Topic::Threshold(ThresholdKind::Fan), "25".to_string()),
            (Topic::Threshold(ThresholdKind::Light), "60".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn unknown_device_is_rejected_without_publishing() {
    let bridge = Bridge::start();

    let result = bridge
        .state
        .dispatcher
        .set_actuator("heater", &json!(1))
        .await;
    assert!(matches!(result, Err(CommandError::InvalidDevice(_))));

    let (status, body) = bridge
        .request(post_json("/api/output/heater", json!({"status": 1})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid device: heater");

    assert_eq!(bridge.bus.publish_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn command_and_state_change_are_recorded_separately() {
    let mut bridge = Bridge::start();

    let (status, body) = bridge
        .request(post_json("/api/output/mini-fan", json!({"status": 1})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(
        bridge.bus.published().await,
        vec![(Topic::Actuator(Actuator::MiniFan), "1".to_string())]
    );

    // Accepting the command neither logs nor broadcasts an event
    elapse(Duration::from_millis(10)).await;
    assert!(bridge.events.try_recv().is_err());
    assert_eq!(
        bridge
            .state
            .store
            .lock()
            .await
            .count_actuator_events(None)
            .unwrap(),
        0
    );

    // The device echo is its own event
    bridge.deliver("mini-fan", "1");
    elapse(Duration::from_millis(10)).await;

    let event = bridge.events.try_recv().unwrap();
    let BridgeEvent::NewOutputData(recorded) = event else {
        panic!("expected newOutputData, got {:?}", event);
    };
    assert_eq!(recorded.actuator, Actuator::MiniFan);
    assert_eq!(recorded.status, ActuatorStatus::On);

    let store = bridge.state.store.lock().await;
    assert_eq!(store.latest_actuator_event(Actuator::MiniFan).unwrap(), Some(recorded));
    assert_eq!(store.count_actuator_events(None).unwrap(), 1);
    drop(store);

    let (_, outputs) = bridge.request(get("/api/output")).await;
    assert_eq!(outputs["minifan"], "on");
    assert_eq!(
        bridge
            .state
            .dispatcher
            .actuator_states()
            .await
            .get(Actuator::MiniFan),
        ActuatorState::On
    );

    let (_, activity) = bridge.request(get("/api/activity?type=minifan")).await;
    assert_eq!(activity["totalRecords"], 1);
}
