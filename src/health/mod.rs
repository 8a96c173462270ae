//! Process-wide health read model.
//!
//! Merges the supervisor's run records, bus counters and the latest
//! `metrics-sample` per source into one serializable report. The aggregator
//! only reads: it never subscribes, publishes, or changes component state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::commbus::{BusStats, CommBus};
use crate::events::{EventKind, EventPayload};
use crate::supervisor::{ComponentState, RunRecord, StatusHandle};

/// Health status, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Health implied by one run record.
    pub fn of(record: &RunRecord) -> Self {
        match record.state {
            ComponentState::Running => HealthStatus::Healthy,
            ComponentState::Registered
            | ComponentState::Starting
            | ComponentState::Restarting => HealthStatus::Degraded,
            ComponentState::Failed => HealthStatus::Unhealthy,
            ComponentState::Stopped if record.stopped_cleanly() => HealthStatus::Healthy,
            ComponentState::Stopped => HealthStatus::Unhealthy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub record: RunRecord,
}

/// Latest sample published by one metrics source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub values: BTreeMap<String, f64>,
    pub sampled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    pub counters: BusStats,
    /// Keyed by metrics source.
    pub metrics: BTreeMap<String, MetricsSnapshot>,
    pub generated_at: DateTime<Utc>,
}

/// Builds [`HealthReport`]s on demand. Cheap to clone and poll.
#[derive(Debug, Clone)]
pub struct HealthAggregator {
    status: StatusHandle,
    bus: Arc<CommBus>,
}

impl HealthAggregator {
    pub fn new(status: StatusHandle, bus: Arc<CommBus>) -> Self {
        Self { status, bus }
    }

    pub async fn get_status(&self) -> HealthReport {
        let snapshot = self.status.status();
        let components: BTreeMap<String, ComponentHealth> = snapshot
            .iter()
            .map(|(name, record)| {
                (
                    name.clone(),
                    ComponentHealth {
                        status: HealthStatus::of(record),
                        record: record.clone(),
                    },
                )
            })
            .collect();

        let overall = components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        // Retained events are oldest first, so later samples overwrite earlier
        // ones from the same source.
        let mut metrics = BTreeMap::new();
        for event in self.bus.retained(EventKind::MetricsSample).await {
            if let EventPayload::MetricsSample(sample) = event.payload() {
                metrics.insert(
                    sample.source.clone(),
                    MetricsSnapshot {
                        values: sample.values.clone(),
                        sampled_at: event.created_at(),
                    },
                );
            }
        }

        HealthReport {
            overall,
            components,
            counters: self.bus.stats().await,
            metrics,
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::{ComponentSpec, FailureInfo, RestartPolicy, Supervisor};
    use crate::types::{CorrelationId, Error, RestartConfig, SupervisorConfig};
    use std::time::Duration;

    fn record(state: ComponentState) -> RunRecord {
        serde_json::from_value(serde_json::json!({
            "name": "x",
            "state": state,
            "policy": "on-failure",
            "attempt": 1,
            "started_at": null,
            "restart_count": 0,
            "restarts_in_window": 0,
            "last_failure": null,
            "unclean": false,
            "updated_at": Utc::now(),
        }))
        .unwrap()
    }

    #[test]
    fn test_component_health_mapping() {
        assert_eq!(HealthStatus::of(&record(ComponentState::Running)), HealthStatus::Healthy);
        assert_eq!(HealthStatus::of(&record(ComponentState::Starting)), HealthStatus::Degraded);
        assert_eq!(HealthStatus::of(&record(ComponentState::Restarting)), HealthStatus::Degraded);
        assert_eq!(HealthStatus::of(&record(ComponentState::Failed)), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::of(&record(ComponentState::Stopped)), HealthStatus::Healthy);

        let mut aborted = record(ComponentState::Stopped);
        aborted.unclean = true;
        assert_eq!(HealthStatus::of(&aborted), HealthStatus::Unhealthy);

        // Failed once, recovered, then stopped gracefully.
        let mut recovered = record(ComponentState::Stopped);
        recovered.last_failure = Some(FailureInfo {
            reason: "microphone busy".to_string(),
            at: Utc::now(),
        });
        assert_eq!(HealthStatus::of(&recovered), HealthStatus::Healthy);

        recovered.last_attempt_failed = true;
        assert_eq!(HealthStatus::of(&recovered), HealthStatus::Unhealthy);
        assert!(HealthStatus::Unhealthy > HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_empty_report_is_healthy() {
        let bus = Arc::new(CommBus::with_defaults());
        let sup = Supervisor::new(bus.clone(), SupervisorConfig::default());
        let health = HealthAggregator::new(sup.status_handle(), bus);

        let report = health.get_status().await;
        assert_eq!(report.overall, HealthStatus::Healthy);
        assert!(report.components.is_empty());
        assert!(report.metrics.is_empty());
    }

    #[tokio::test]
    async fn test_report_merges_components_and_metrics() {
        let bus = Arc::new(CommBus::with_defaults());
        let sup = Supervisor::new(bus.clone(), SupervisorConfig::default());
        sup.register(
            ComponentSpec::from_fn("listener", |ctx| async move {
                ctx.cancelled().await;
                Ok(())
            })
            .unwrap(),
        )
        .await
        .unwrap();
        sup.register(
            ComponentSpec::from_fn("generator", |_ctx| async {
                Err(Error::component_failed("out of memory"))
            })
            .unwrap()
            .with_restart(RestartConfig {
                policy: RestartPolicy::Never,
                ..RestartConfig::default()
            }),
        )
        .await
        .unwrap();
        sup.start_all().await.unwrap();

        for (source, value) in [("gpu", 10.0), ("cpu", 55.0), ("gpu", 12.5)] {
            let event = bus
                .make_event(
                    EventKind::MetricsSample,
                    EventPayload::metrics_sample(source, [("load", value)]),
                    CorrelationId::new(),
                    None,
                )
                .unwrap();
            bus.publish(event).await.unwrap();
        }

        let report = HealthAggregator::new(sup.status_handle(), bus.clone())
            .get_status()
            .await;
        assert_eq!(report.overall, HealthStatus::Unhealthy);
        assert_eq!(report.components["listener"].status, HealthStatus::Healthy);
        assert_eq!(report.components["generator"].status, HealthStatus::Unhealthy);
        assert_eq!(report.metrics["gpu"].values["load"], 12.5);
        assert_eq!(report.metrics["cpu"].values["load"], 55.0);
        assert_eq!(report.counters.events_published, 3);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["overall"], "unhealthy");

        sup.shutdown(Duration::from_secs(1)).await;
    }
}
