//! Bus integration tests: ordering, fan-out independence and durable replay.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use solo_core::commbus::DeliveryPolicy;
use solo_core::types::{BusConfig, ComponentId, CorrelationId, KindConfig};
use solo_core::{CommBus, Event, EventKind, EventPayload, KindRegistry, PublishOutcome};
use std::sync::Arc;
use std::time::Duration;

fn component(name: &str) -> ComponentId {
    ComponentId::try_from(name).unwrap()
}

fn bus_with(kind: EventKind, config: KindConfig) -> CommBus {
    let mut bus_config = BusConfig::default();
    bus_config.kinds.insert(kind, config);
    CommBus::new(KindRegistry::with_defaults(), &bus_config)
}

/// Helper: a generation-completed event whose correlation id is `id`.
fn completed(bus: &CommBus, id: &str) -> Event {
    bus.make_event(
        EventKind::GenerationCompleted,
        EventPayload::generation_completed(format!("response {id}"), 42, 900, "llama-3-8b"),
        CorrelationId::try_from(id).unwrap(),
        None,
    )
    .unwrap()
}

async fn drain(stream: &mut solo_core::EventStream) -> Vec<String> {
    let mut ids = Vec::new();
    while let Some(event) = stream.try_recv() {
        ids.push(event.correlation_id().to_string());
    }
    ids
}

// =============================================================================
// Ordering
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn same_kind_publishes_arrive_in_order(count in 1usize..64) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        let received = rt.block_on(async {
            let bus = CommBus::with_defaults();
            let mut stream = bus
                .subscribe(EventKind::GenerationCompleted, &component("persistence"))
                .await
                .unwrap();

            for i in 0..count {
                bus.publish(completed(&bus, &format!("req-{i}"))).await.unwrap();
            }
            drain(&mut stream).await
        });

        let expected: Vec<String> = (0..count).map(|i| format!("req-{i}")).collect();
        prop_assert_eq!(received, expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_consumer_sees_publish_order() {
    let bus = Arc::new(CommBus::with_defaults());
    let mut stream = bus
        .subscribe(EventKind::GenerationCompleted, &component("persistence"))
        .await
        .unwrap();

    let consumer = tokio::spawn(async move {
        let mut ids = Vec::new();
        while ids.len() < 200 {
            let event = stream.recv().await.unwrap();
            ids.push(event.correlation_id().to_string());
        }
        ids
    });

    for i in 0..200 {
        bus.publish(completed(&bus, &format!("{i:03}"))).await.unwrap();
    }

    let ids = consumer.await.unwrap();
    let expected: Vec<String> = (0..200).map(|i| format!("{i:03}")).collect();
    assert_eq!(ids, expected);
}

// =============================================================================
// Fan-out independence
// =============================================================================

#[tokio::test]
async fn test_slow_subscriber_does_not_delay_fast_one() {
    let bus = Arc::new(bus_with(
        EventKind::MetricsSample,
        KindConfig {
            capacity: Some(4),
            policy: Some(DeliveryPolicy::DropOldest),
            retain: Some(0),
        },
    ));
    let mut fast = bus
        .subscribe(EventKind::MetricsSample, &component("dashboard"))
        .await
        .unwrap();
    let mut slow = bus
        .subscribe(EventKind::MetricsSample, &component("archiver"))
        .await
        .unwrap();

    let mut fast_seen = 0;
    for i in 0..10 {
        let event = bus
            .make_event(
                EventKind::MetricsSample,
                EventPayload::metrics_sample("gpu", [("util", i as f64)]),
                CorrelationId::try_from(format!("m{i}")).unwrap(),
                None,
            )
            .unwrap();
        // Publishing never waits on the stalled subscriber.
        tokio::time::timeout(Duration::from_millis(100), bus.publish(event))
            .await
            .unwrap()
            .unwrap();
        fast_seen += fast.try_recv().map_or(0, |_| 1);
    }

    assert_eq!(fast_seen, 10);
    assert_eq!(drain(&mut slow).await, vec!["m6", "m7", "m8", "m9"]);
    assert_eq!(bus.stats().await.events_dropped, 6);
}

#[tokio::test]
async fn test_each_subscriber_gets_full_sequence() {
    let bus = CommBus::with_defaults();
    let mut a = bus
        .subscribe(EventKind::GenerationCompleted, &component("persistence"))
        .await
        .unwrap();
    let mut b = bus
        .subscribe(EventKind::GenerationCompleted, &component("dashboard"))
        .await
        .unwrap();

    for id in ["x", "y", "z"] {
        let outcome = bus.publish(completed(&bus, id)).await.unwrap();
        assert_eq!(outcome, PublishOutcome::Accepted { delivered: 2 });
    }

    assert_eq!(drain(&mut a).await, vec!["x", "y", "z"]);
    assert_eq!(drain(&mut b).await, vec!["x", "y", "z"]);
}

#[tokio::test]
async fn test_timed_out_subscriber_does_not_block_others() {
    let bus = bus_with(
        EventKind::GenerationCompleted,
        KindConfig {
            capacity: Some(1),
            policy: Some(DeliveryPolicy::block_for(Duration::from_millis(50))),
            retain: Some(0),
        },
    );
    let mut stalled = bus
        .subscribe(EventKind::GenerationCompleted, &component("stalled"))
        .await
        .unwrap();
    let mut live = bus
        .subscribe(EventKind::GenerationCompleted, &component("live"))
        .await
        .unwrap();

    bus.publish(completed(&bus, "a")).await.unwrap();
    assert_eq!(drain(&mut live).await, vec!["a"]);

    let outcome = bus.publish(completed(&bus, "b")).await.unwrap();
    assert_eq!(
        outcome,
        PublishOutcome::TimedOut {
            delivered: 1,
            timed_out: 1
        }
    );
    assert_eq!(drain(&mut live).await, vec!["b"]);
    assert_eq!(drain(&mut stalled).await, vec!["a"]);
}

// =============================================================================
// Durable replay
// =============================================================================

#[tokio::test]
async fn test_late_subscriber_without_retention_gets_nothing() {
    let bus = CommBus::with_defaults();
    for id in ["a", "b", "c"] {
        bus.publish(completed(&bus, id)).await.unwrap();
    }

    let mut late = bus
        .subscribe(EventKind::GenerationCompleted, &component("late"))
        .await
        .unwrap();
    assert!(drain(&mut late).await.is_empty());
}

#[tokio::test]
async fn test_late_subscriber_gets_last_retained() {
    let bus = bus_with(
        EventKind::GenerationCompleted,
        KindConfig {
            capacity: None,
            policy: None,
            retain: Some(2),
        },
    );
    for id in ["a", "b", "c"] {
        bus.publish(completed(&bus, id)).await.unwrap();
    }

    let mut late = bus
        .subscribe(EventKind::GenerationCompleted, &component("late"))
        .await
        .unwrap();
    assert_eq!(drain(&mut late).await, vec!["b", "c"]);
}

#[tokio::test]
async fn test_replay_exactly_last_k() {
    for k in 1..=5usize {
        let bus = bus_with(
            EventKind::StatusUpdate,
            KindConfig {
                capacity: Some(8),
                policy: Some(DeliveryPolicy::DropOldest),
                retain: Some(k),
            },
        );
        for i in 0..=k {
            let event = bus
                .make_event(
                    EventKind::StatusUpdate,
                    EventPayload::StatusUpdate {
                        component: "generator".to_string(),
                        status: serde_json::json!({ "seq": i }),
                    },
                    CorrelationId::try_from(format!("s{i}")).unwrap(),
                    None,
                )
                .unwrap();
            bus.publish(event).await.unwrap();
        }

        let mut late = bus
            .subscribe(EventKind::StatusUpdate, &component("late"))
            .await
            .unwrap();
        let expected: Vec<String> = (1..=k).map(|i| format!("s{i}")).collect();
        assert_eq!(drain(&mut late).await, expected, "retain = {k}");
    }
}

#[tokio::test]
async fn test_into_stream_adapter() {
    use futures::StreamExt;

    let bus = CommBus::with_defaults();
    let stream = bus
        .subscribe(EventKind::GenerationCompleted, &component("persistence"))
        .await
        .unwrap();
    let handle = stream.handle().clone();

    bus.publish(completed(&bus, "a")).await.unwrap();
    bus.publish(completed(&bus, "b")).await.unwrap();
    bus.unsubscribe(&handle).await;

    let ids: Vec<String> = stream
        .into_stream()
        .map(|e| e.correlation_id().to_string())
        .collect()
        .await;
    assert_eq!(ids, vec!["a", "b"]);
}
