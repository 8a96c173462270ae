//! Supervisor integration tests: restart budgets, shutdown and cleanup.

use pretty_assertions::assert_eq;
use solo_core::supervisor::{
    BackoffPolicy, ComponentState, ReadinessMode, RestartLimit, RestartPolicy, StatusSnapshot,
};
use solo_core::types::{RestartConfig, SupervisorConfig};
use solo_core::{CommBus, ComponentContext, ComponentSpec, Error, EventKind, Supervisor};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn supervisor() -> (Arc<CommBus>, Supervisor) {
    let bus = Arc::new(CommBus::with_defaults());
    let sup = Supervisor::new(bus.clone(), SupervisorConfig::default());
    (bus, sup)
}

fn cooperative(name: &str) -> ComponentSpec {
    ComponentSpec::from_fn(name, |ctx| async move {
        ctx.cancelled().await;
        Ok(())
    })
    .unwrap()
}

async fn crash_after_subscribing(ctx: ComponentContext) -> solo_core::Result<()> {
    let _stt = ctx.subscribe(EventKind::SpeechToText).await?;
    let _tts = ctx.subscribe(EventKind::TextToSpeech).await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    panic!("audio device vanished");
}

async fn ignore_cancellation(ctx: ComponentContext) -> solo_core::Result<()> {
    let _stream = ctx.subscribe(EventKind::ActionRequested).await?;
    loop {
        // Never checks the cancellation token.
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Helper: wait until `name` reaches `state`, bounded by two seconds.
async fn wait_for_state(sup: &Supervisor, name: &str, state: ComponentState) -> StatusSnapshot {
    let handle = sup.status_handle();
    tokio::time::timeout(
        Duration::from_secs(2),
        handle.wait_until(|t| t.get(name).is_some_and(|r| r.state == state)),
    )
    .await
    .unwrap_or_else(|_| panic!("{name} never reached {state}"))
}

// =============================================================================
// Restart budget
// =============================================================================

#[tokio::test]
async fn test_restart_budget_exhaustion() {
    let (_bus, sup) = supervisor();
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();

    sup.register(
        ComponentSpec::from_fn("generator", move |_ctx| {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err(Error::component_failed(format!("model load failed (attempt {n})")))
            }
        })
        .unwrap()
        .with_restart(RestartConfig {
            policy: RestartPolicy::OnFailure,
            backoff: BackoffPolicy::constant(Duration::from_millis(5)),
            limit: Some(RestartLimit {
                max_restarts: 3,
                window: Duration::from_secs(60),
            }),
        }),
    )
    .await
    .unwrap();

    sup.start_all().await.unwrap();
    let status = wait_for_state(&sup, "generator", ComponentState::Stopped).await;

    let record = &status["generator"];
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    assert_eq!(record.restart_count, 3);
    assert_eq!(record.attempt, 4);
    assert_eq!(
        record.last_failure.as_ref().map(|f| f.reason.as_str()),
        Some("component failed: model load failed (attempt 4)")
    );
    assert!(!record.stopped_cleanly());
}

#[tokio::test(start_paused = true)]
async fn test_restart_window_slides() {
    let (_bus, sup) = supervisor();
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();

    // Fails three times, then settles. Each restart happens after the
    // previous one has left the window, so a budget of one never runs out.
    sup.register(
        ComponentSpec::from_fn("listener", move |ctx| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                    return Err(Error::component_failed("microphone busy"));
                }
                ctx.cancelled().await;
                Ok(())
            }
        })
        .unwrap()
        .with_restart(RestartConfig {
            policy: RestartPolicy::OnFailure,
            backoff: BackoffPolicy::constant(Duration::from_millis(150)),
            limit: Some(RestartLimit {
                max_restarts: 1,
                window: Duration::from_millis(100),
            }),
        }),
    )
    .await
    .unwrap();

    sup.start_all().await.unwrap();
    let status = wait_for_state(&sup, "listener", ComponentState::Running).await;

    assert_eq!(status["listener"].restart_count, 3);
    assert_eq!(status["listener"].attempt, 4);
    assert!(sup.shutdown(Duration::from_secs(1)).await.is_clean());

    // Earlier failures were recovered from, so the final stop is clean.
    let status = sup.status();
    assert!(status["listener"].last_failure.is_some());
    assert!(status["listener"].stopped_cleanly());
}

#[tokio::test]
async fn test_restarted_component_resubscribes() {
    let (bus, sup) = supervisor();
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();

    sup.register(
        ComponentSpec::from_fn("persistence", move |ctx| {
            let counter = counter.clone();
            async move {
                let _stream = ctx.subscribe(EventKind::GenerationCompleted).await?;
                ctx.mark_ready();
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(Error::component_failed("database locked"));
                }
                ctx.cancelled().await;
                Ok(())
            }
        })
        .unwrap()
        .with_readiness(ReadinessMode::Explicit)
        .with_restart(RestartConfig {
            policy: RestartPolicy::OnFailure,
            backoff: BackoffPolicy::constant(Duration::from_millis(5)),
            limit: None,
        }),
    )
    .await
    .unwrap();

    sup.start_all().await.unwrap();
    let handle = sup.status_handle();
    tokio::time::timeout(
        Duration::from_secs(2),
        handle.wait_until(|t| {
            t.get("persistence")
                .is_some_and(|r| r.attempt == 2 && r.state == ComponentState::Running)
        }),
    )
    .await
    .unwrap();

    // The crashed attempt's subscription is gone; only the new one remains.
    assert_eq!(bus.subscriptions().count_for(EventKind::GenerationCompleted).await, 1);
    sup.shutdown(Duration::from_secs(1)).await;
    assert_eq!(bus.subscriptions().count().await, 0);
}

// =============================================================================
// Subscription cleanup
// =============================================================================

#[tokio::test]
async fn test_subscriptions_removed_when_component_crashes() {
    let (bus, sup) = supervisor();

    sup.register(
        ComponentSpec::from_fn("speech", crash_after_subscribing)
            .unwrap()
            .with_restart(RestartConfig {
                policy: RestartPolicy::Never,
                ..RestartConfig::default()
            }),
    )
    .await
    .unwrap();

    sup.start_all().await.unwrap();
    let status = wait_for_state(&sup, "speech", ComponentState::Stopped).await;

    assert_eq!(
        status["speech"].last_failure.as_ref().map(|f| f.reason.as_str()),
        Some("panicked: audio device vanished")
    );
    assert_eq!(bus.subscriptions().count().await, 0);
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_graceful_shutdown() {
    let (bus, sup) = supervisor();
    for name in ["generator", "metrics", "persistence"] {
        sup.register(cooperative(name)).await.unwrap();
    }

    let started = sup.start_all().await.unwrap();
    assert_eq!(started.running, vec!["generator", "metrics", "persistence"]);

    let timeout = Duration::from_secs(2);
    let report = sup.shutdown(timeout).await;

    assert_eq!(report.clean, vec!["generator", "metrics", "persistence"]);
    assert!(report.unclean.is_empty());
    assert!(report.elapsed < timeout);
    for record in sup.status().values() {
        assert_eq!(record.state, ComponentState::Stopped);
        assert!(record.stopped_cleanly());
    }
    assert_eq!(bus.subscriptions().count().await, 0);
}

#[tokio::test]
async fn test_forced_termination_of_stuck_component() {
    let (bus, sup) = supervisor();
    sup.register(cooperative("persistence")).await.unwrap();
    sup.register(
        ComponentSpec::from_fn("stubborn", ignore_cancellation).unwrap(),
    )
    .await
    .unwrap();

    sup.start_all().await.unwrap();
    let report = sup.shutdown(Duration::from_millis(200)).await;

    assert_eq!(report.clean, vec!["persistence"]);
    assert_eq!(report.unclean, vec!["stubborn"]);
    assert!(!report.is_clean());

    let status = sup.status();
    assert!(status["persistence"].stopped_cleanly());
    assert_eq!(status["stubborn"].state, ComponentState::Stopped);
    assert!(status["stubborn"].unclean);
    assert_eq!(bus.subscriptions().count().await, 0);
}
