//! End-to-end behaviour of the simulation engine and publish loop

use async_trait::async_trait;
use door_sensor::domain::{DoorEvent, NotificationKind, SensorId, StoreStatus};
use door_sensor::infra::Metrics;
use door_sensor::services::publish_loop::MAX_CONSECUTIVE_FAILURES;
use door_sensor::services::{
    ControlSurface, DelayScheduler, FlowSimulator, LoopExit, LoopState, PublishError, PublishLoop,
    Publisher, SimulationState,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn configured(sensor_id: u32, max_capacity: u32, status: StoreStatus) -> Arc<SimulationState> {
    let state = Arc::new(SimulationState::new("edge-01", "DoorSensor"));
    state.set_sensor_id(SensorId(sensor_id));
    state.set_max_capacity(max_capacity);
    state.set_store_status(status);
    state
}

#[derive(Default)]
struct RecordingPublisher {
    events: Mutex<Vec<DoorEvent>>,
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, event: &DoorEvent) -> Result<(), PublishError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

struct FailingPublisher;

#[async_trait]
impl Publisher for FailingPublisher {
    async fn publish(&self, _event: &DoorEvent) -> Result<(), PublishError> {
        Err(PublishError::Transport("connection refused".to_string()))
    }
}

#[test]
fn test_first_tick_in_open_store_enters() {
    let state = configured(1, 5, StoreStatus::Open);
    let mut simulator = FlowSimulator::with_seed(state.clone(), 11);

    let event = simulator.decide().into_event().unwrap();
    assert_eq!(event.notification_kind, NotificationKind::CustomerEntered);
    assert_eq!(event.customer_count, 1);
}

#[test]
fn test_unset_sensor_id_never_produces_events() {
    let state = Arc::new(SimulationState::new("edge-01", "DoorSensor"));
    state.set_max_capacity(5);
    state.set_store_status(StoreStatus::Open);
    let mut simulator = FlowSimulator::with_seed(state.clone(), 11);

    for _ in 0..20 {
        let decision = simulator.decide();
        assert!(!decision.is_initialized());
        assert!(decision.event().is_none());
    }
    assert_eq!(state.snapshot().customer_count, 0);
}

#[test]
fn test_closing_store_drains_to_store_closed() {
    let state = configured(1, 10, StoreStatus::Open);
    let control = ControlSurface::new(state.clone(), Arc::new(Metrics::new()));
    control.set_customer_count(4);
    control.apply_desired_properties(&json!({ "StoreStatus": 0 }));

    let mut simulator = FlowSimulator::with_seed(state.clone(), 5);
    let kinds: Vec<_> = (0..7)
        .map(|_| simulator.decide().into_event().unwrap().notification_kind)
        .collect();

    assert_eq!(&kinds[..4], &[NotificationKind::CustomerExited; 4]);
    assert_eq!(&kinds[4..], &[NotificationKind::StoreClosed; 3]);
    assert_eq!(state.snapshot().customer_count, 0);
}

#[test]
fn test_count_stays_in_bounds_under_concurrent_commands() {
    const MAX: u32 = 8;
    let state = configured(1, MAX, StoreStatus::Open);
    let control = ControlSurface::new(state.clone(), Arc::new(Metrics::new()));

    let ticker = {
        let state = state.clone();
        std::thread::spawn(move || {
            let mut simulator = FlowSimulator::with_seed(state, 99);
            for _ in 0..5_000 {
                let event = simulator.decide().into_event().unwrap();
                assert!(event.customer_count <= MAX);
            }
        })
    };

    let commanders: Vec<_> = (0..4)
        .map(|worker| {
            let control = control.clone();
            std::thread::spawn(move || {
                for i in 0..250i64 {
                    let requested = (i * 7 + worker * 13) % 25 - 8;
                    let applied = control.set_customer_count(requested).unwrap();
                    assert!(applied <= MAX);
                }
            })
        })
        .collect();

    for handle in commanders {
        handle.join().unwrap();
    }
    ticker.join().unwrap();

    assert!(state.snapshot().customer_count <= MAX);
}

#[test]
fn test_set_customer_count_matches_min_rule() {
    let state = configured(1, 5, StoreStatus::Closed);
    let control = ControlSurface::new(state.clone(), Arc::new(Metrics::new()));

    for v in [0i64, 1, 4, 5, 6, 100] {
        assert_eq!(control.set_customer_count(v), Some(v.min(5) as u32));
        assert_eq!(state.snapshot().customer_count, v.min(5) as u32);
    }
}

#[tokio::test]
async fn test_loop_stops_after_ten_publish_failures() {
    let state = configured(1, 5, StoreStatus::Open);
    let metrics = Arc::new(Metrics::new());
    let mut publish_loop = PublishLoop::new(
        FlowSimulator::with_seed(state, 8),
        DelayScheduler::with_ranges(1..2, 1..2),
        FailingPublisher,
        metrics.clone(),
    );
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let exit = publish_loop.run(shutdown_rx).await;

    assert_eq!(exit, LoopExit::PublishFailuresExceeded { failures: MAX_CONSECUTIVE_FAILURES });
    assert!(exit.is_failure());
    assert_eq!(publish_loop.state(), LoopState::Stopped);
    assert_eq!(metrics.publish_failures_total(), u64::from(MAX_CONSECUTIVE_FAILURES));
}

#[tokio::test]
async fn test_loop_publishes_consistent_events_until_cancelled() {
    let state = configured(2, 3, StoreStatus::Open);
    let publisher = Arc::new(RecordingPublisher::default());
    let metrics = Arc::new(Metrics::new());
    let mut publish_loop = PublishLoop::new(
        FlowSimulator::with_seed(state, 21),
        DelayScheduler::with_ranges(1..2, 1..2),
        publisher.clone(),
        metrics.clone(),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let watched = metrics.clone();
    tokio::spawn(async move {
        while watched.published_total() < 25 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let _ = shutdown_tx.send(true);
    });

    assert_eq!(publish_loop.run(shutdown_rx).await, LoopExit::Cancelled);

    let events = publisher.events.lock();
    assert!(events.len() >= 25);
    assert_eq!(events[0].notification_kind, NotificationKind::CustomerEntered);

    // Each event's count follows from the previous one and its kind
    let mut expected = 0u32;
    for event in events.iter() {
        match event.notification_kind {
            NotificationKind::CustomerEntered => expected += 1,
            NotificationKind::CustomerExited => expected -= 1,
            NotificationKind::StoreClosed => {}
        }
        assert_eq!(event.customer_count, expected);
        assert!(event.customer_count <= 3);
        assert_eq!(event.sensor_id, SensorId(2));
    }
}
