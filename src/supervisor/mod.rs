//! Component supervision.
//!
//! The supervisor launches each registered component as an independent task,
//! applies its restart policy when it fails, and coordinates shutdown. Run
//! records are owned by a single record-keeper task; [`StatusHandle`] gives
//! cheap, consistent snapshots to the status surface.
//!
//! Lifecycle per component:
//! ```text
//! register → start_all → starting → running ─┬─ ok/cancelled ─→ stopped
//!                           ↑                └─ err/panic ────→ failed
//!                           └──── restarting ←─ budget left ──────┘
//! ```

mod actor;
mod component;
mod policy;
mod records;
mod recovery;
mod state;

pub use component::{
    component_fn, Component, ComponentContext, ComponentFn, ComponentSpec, ReadinessMode,
};
pub use policy::{BackoffPolicy, RestartLimit, RestartPolicy, UNLIMITED_WINDOW};
pub use records::{StatusHandle, StatusSnapshot};
pub use state::{ComponentState, FailureInfo, RunRecord};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::commbus::CommBus;
use crate::types::{ComponentId, Error, RestartConfig, Result, SupervisorConfig};
use actor::{AttemptSlot, ComponentActor};
use records::RecordKeeper;
use state::RecordChange;

/// Result of [`Supervisor::start_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartReport {
    /// Reached `running`.
    pub running: Vec<String>,
    /// First attempt failed (the component may already be restarting).
    pub failed: Vec<String>,
    /// Finished cleanly before ever reporting ready.
    pub stopped: Vec<String>,
    /// Still starting when the startup timeout expired.
    pub pending: Vec<String>,
}

impl StartReport {
    pub fn all_running(&self) -> bool {
        self.failed.is_empty() && self.stopped.is_empty() && self.pending.is_empty()
    }
}

/// Result of [`Supervisor::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Exited on their own after cancellation.
    pub clean: Vec<String>,
    /// Ignored cancellation and were aborted.
    pub unclean: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.unclean.is_empty()
    }
}

struct Launched {
    actor: JoinHandle<()>,
    slot: AttemptSlot,
}

enum Slot {
    Pending(ComponentSpec),
    Launched(Launched),
    Done,
}

#[derive(Default)]
struct Inner {
    components: BTreeMap<String, Slot>,
    shut_down: bool,
}

/// Supervises components sharing one [`CommBus`].
///
/// Must be created inside a Tokio runtime.
pub struct Supervisor {
    bus: Arc<CommBus>,
    config: SupervisorConfig,
    root: CancellationToken,
    records: RecordKeeper,
    status: StatusHandle,
    inner: Mutex<Inner>,
}

impl Supervisor {
    pub fn new(bus: Arc<CommBus>, config: SupervisorConfig) -> Self {
        let (records, status, _table) = RecordKeeper::spawn();
        Self {
            bus,
            config,
            root: CancellationToken::new(),
            records,
            status,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn bus(&self) -> &Arc<CommBus> {
        &self.bus
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Default bound passed to [`shutdown`](Self::shutdown) by callers that
    /// have no better value.
    pub fn shutdown_timeout(&self) -> Duration {
        self.config.shutdown_timeout
    }

    /// Register a component. It is launched by the next [`start_all`](Self::start_all).
    pub async fn register(&self, spec: ComponentSpec) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let name = spec.name().to_string();

        if inner.shut_down {
            return Err(Error::state_transition(format!(
                "cannot register {name}: supervisor is shut down"
            )));
        }
        if inner.components.contains_key(&name) {
            return Err(Error::duplicate_component(name));
        }

        let policy = self.restart_config(&spec).policy;
        self.records.register(&name, policy).await?;
        inner.components.insert(name.clone(), Slot::Pending(spec));

        tracing::info!(component = %name, policy = ?policy, "component registered");
        Ok(())
    }

    fn restart_config(&self, spec: &ComponentSpec) -> RestartConfig {
        spec.restart()
            .unwrap_or_else(|| self.config.restart_for(spec.name()))
    }

    /// Launch every registered component that is not running yet.
    ///
    /// Waits until each has either reached `running` or failed its first
    /// attempt, bounded by the configured startup timeout. One component
    /// failing never prevents the others from starting.
    pub async fn start_all(&self) -> Result<StartReport> {
        let launched = {
            let mut inner = self.inner.lock().await;
            if inner.shut_down {
                return Err(Error::state_transition(
                    "cannot start components: supervisor is shut down",
                ));
            }

            let mut launched = Vec::new();
            for (name, slot) in inner.components.iter_mut() {
                if !matches!(slot, Slot::Pending(_)) {
                    continue;
                }
                let Slot::Pending(spec) = std::mem::replace(slot, Slot::Done) else {
                    continue;
                };
                *slot = Slot::Launched(self.launch(spec));
                launched.push(name.clone());
            }
            launched
        };

        if launched.is_empty() {
            return Ok(StartReport::default());
        }
        tracing::info!(count = launched.len(), "starting components");

        let deadline = Instant::now() + self.config.startup_timeout;
        let settled = |table: &BTreeMap<String, RunRecord>| {
            launched
                .iter()
                .all(|name| table.get(name).map_or(true, has_settled))
        };
        let snapshot =
            match tokio::time::timeout_at(deadline, self.status.wait_until(settled)).await {
                Ok(snapshot) => snapshot,
                Err(_) => self.status.status(),
            };

        let mut report = StartReport::default();
        for name in launched {
            let Some(record) = snapshot.get(&name) else {
                continue;
            };
            if !has_settled(record) {
                report.pending.push(name);
            } else if record.state == ComponentState::Running {
                report.running.push(name);
            } else if record.last_failure.is_some() {
                report.failed.push(name);
            } else {
                report.stopped.push(name);
            }
        }

        if report.all_running() {
            tracing::info!(running = report.running.len(), "all components running");
        } else {
            tracing::warn!(
                running = report.running.len(),
                failed = ?report.failed,
                stopped = ?report.stopped,
                pending = ?report.pending,
                "start finished with components not running"
            );
        }
        Ok(report)
    }

    fn launch(&self, spec: ComponentSpec) -> Launched {
        let slot = AttemptSlot::default();
        let actor = ComponentActor::new(
            spec.id().clone(),
            spec.component(),
            self.restart_config(&spec),
            spec.readiness(),
            self.bus.clone(),
            self.records.clone(),
            self.root.child_token(),
            slot.clone(),
        );
        Launched {
            actor: actor.spawn(),
            slot,
        }
    }

    /// Stop every component.
    ///
    /// Cancels all components, then waits up to `timeout` for them to exit.
    /// Components still running at the deadline are aborted, marked unclean,
    /// and logged at error level. Calling it again returns an empty report.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        let started = Instant::now();
        let deadline = started + timeout;

        let (launched, never_started) = {
            let mut inner = self.inner.lock().await;
            if inner.shut_down {
                return ShutdownReport::default();
            }
            inner.shut_down = true;
            self.root.cancel();

            let mut launched = Vec::new();
            let mut never_started = Vec::new();
            for (name, slot) in inner.components.iter_mut() {
                match std::mem::replace(slot, Slot::Done) {
                    Slot::Launched(handle) => launched.push((name.clone(), handle)),
                    Slot::Pending(_) => never_started.push(name.clone()),
                    Slot::Done => {}
                }
            }
            (launched, never_started)
        };

        tracing::info!(components = launched.len(), timeout = ?timeout, "shutting down");

        let mut report = ShutdownReport::default();
        for name in never_started {
            let _ = self.records.update(&name, RecordChange::Stopped).await;
            report.clean.push(name);
        }

        for (name, mut handle) in launched {
            match tokio::time::timeout_at(deadline, &mut handle.actor).await {
                Ok(_) => report.clean.push(name),
                Err(_) => {
                    handle.slot.abort();
                    handle.actor.abort();
                    if let Ok(id) = ComponentId::from_string(name.clone()) {
                        self.bus.remove_component(&id).await;
                    }
                    let _ = self.records.update(&name, RecordChange::ForceStopped).await;
                    tracing::error!(
                        component = %name,
                        "unclean shutdown: component ignored cancellation and was aborted"
                    );
                    report.unclean.push(name);
                }
            }
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            clean = report.clean.len(),
            unclean = report.unclean.len(),
            elapsed = ?report.elapsed,
            "shutdown complete"
        );
        report
    }

    /// Snapshot of every component's run record.
    pub fn status(&self) -> StatusSnapshot {
        self.status.status()
    }

    /// Cloneable read handle for status consumers.
    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    pub async fn component_names(&self) -> Vec<String> {
        self.inner.lock().await.components.keys().cloned().collect()
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .field("cancelled", &self.root.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// First attempt has an outcome: ready, failed, or finished.
fn has_settled(record: &RunRecord) -> bool {
    match record.state {
        ComponentState::Registered => false,
        ComponentState::Starting => record.attempt > 1,
        _ => true,
    }
}
