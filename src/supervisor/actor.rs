//! Per-component supervision loop.
//!
//! One actor task per component. Each attempt runs in its own spawned task so
//! panics are contained and a stuck attempt can be aborted at shutdown.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::component::{Component, ComponentContext, FirstYield, ReadinessMode, ReadySignal};
use super::policy::{RestartBudget, RestartPolicy};
use super::records::RecordKeeper;
use super::recovery::TaskExit;
use super::state::RecordChange;
use crate::commbus::CommBus;
use crate::types::{ComponentId, RestartConfig, Result};

type AttemptFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Abort handle of the attempt currently in flight, if any.
#[derive(Debug, Clone, Default)]
pub(crate) struct AttemptSlot {
    handle: Arc<Mutex<Option<AbortHandle>>>,
}

impl AttemptSlot {
    fn set(&self, handle: AbortHandle) {
        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    fn clear(&self) {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Abort the running attempt. Returns `false` if none was running.
    pub(crate) fn abort(&self) -> bool {
        match self.handle.lock().unwrap_or_else(PoisonError::into_inner).take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

/// How one attempt ended.
#[derive(Debug, PartialEq)]
enum Outcome {
    Stopped,
    Failed(String),
    /// Force-aborted; the supervisor records the unclean stop.
    Aborted,
}

pub(crate) struct ComponentActor {
    id: ComponentId,
    component: Arc<dyn Component>,
    restart: RestartConfig,
    readiness: ReadinessMode,
    bus: Arc<CommBus>,
    records: RecordKeeper,
    cancel: CancellationToken,
    slot: AttemptSlot,
}

impl ComponentActor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ComponentId,
        component: Arc<dyn Component>,
        restart: RestartConfig,
        readiness: ReadinessMode,
        bus: Arc<CommBus>,
        records: RecordKeeper,
        cancel: CancellationToken,
        slot: AttemptSlot,
    ) -> Self {
        Self {
            id,
            component,
            restart,
            readiness,
            bus,
            records,
            cancel,
            slot,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn record(&self, change: RecordChange) {
        // Rejections are already logged by the record table.
        let _ = self.records.update(self.id.as_str(), change).await;
    }

    async fn run(self) {
        let name = self.id.as_str();
        let mut budget = RestartBudget::new(self.restart.limit);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.record(RecordChange::Starting { attempt }).await;
            tracing::info!(component = name, attempt, "component starting");

            let outcome = self.run_attempt(attempt).await;
            self.bus.remove_component(&self.id).await;

            let reason = match outcome {
                Outcome::Aborted => return,
                Outcome::Stopped => {
                    self.record(RecordChange::Stopped).await;
                    tracing::info!(component = name, attempt, "component stopped");
                    return;
                }
                Outcome::Failed(reason) => reason,
            };

            tracing::error!(component = name, attempt, reason = %reason, "component failed");
            self.record(RecordChange::Failed {
                reason: reason.clone(),
            })
            .await;

            if !self.restart.policy.restarts_on_failure() || self.cancel.is_cancelled() {
                self.record(RecordChange::Stopped).await;
                return;
            }

            let Some(used) = budget.try_acquire(Instant::now()) else {
                tracing::error!(
                    component = name,
                    restarts = attempt - 1,
                    "restart budget exhausted, giving up"
                );
                self.record(RecordChange::Stopped).await;
                return;
            };

            let delay = self.restart.backoff.delay(used);
            self.record(RecordChange::Restarting {
                delay,
                restarts_in_window: used + 1,
            })
            .await;
            tracing::warn!(component = name, attempt, delay = ?delay, "restarting component");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => {
                    self.record(RecordChange::Stopped).await;
                    return;
                }
            }
        }
    }

    async fn run_attempt(&self, attempt: u32) -> Outcome {
        let ready = ReadySignal::new();
        let ctx = ComponentContext::new(
            self.id.clone(),
            attempt,
            self.bus.clone(),
            self.cancel.clone(),
            ready.clone(),
        );
        let component = self.component.clone();
        let body: AttemptFuture = Box::pin(async move { component.run(ctx).await });

        let mut join = match self.readiness {
            ReadinessMode::FirstYield => tokio::spawn(FirstYield::new(body, ready.clone())),
            ReadinessMode::Explicit => tokio::spawn(body),
        };
        self.slot.set(join.abort_handle());

        let mut announced = false;
        let result = loop {
            tokio::select! {
                biased;
                res = &mut join => break res,
                _ = ready.wait(), if !announced => {
                    announced = true;
                    if !self.cancel.is_cancelled() {
                        self.record(RecordChange::Running).await;
                        tracing::info!(component = self.id.as_str(), attempt, "component running");
                    }
                }
            }
        };
        self.slot.clear();

        let cancelled = self.cancel.is_cancelled();
        match result {
            Ok(Ok(())) if cancelled => Outcome::Stopped,
            Ok(Ok(())) => match self.restart.policy {
                RestartPolicy::Always => Outcome::Failed("exited unexpectedly".to_string()),
                RestartPolicy::Never | RestartPolicy::OnFailure => Outcome::Stopped,
            },
            Ok(Err(err)) if cancelled => {
                tracing::debug!(component = self.id.as_str(), error = %err, "error during shutdown");
                Outcome::Stopped
            }
            Ok(Err(err)) => Outcome::Failed(err.to_string()),
            Err(join_err) => match TaskExit::from(join_err) {
                TaskExit::Aborted => Outcome::Aborted,
                TaskExit::Panicked(_) if cancelled => Outcome::Stopped,
                TaskExit::Panicked(msg) => Outcome::Failed(format!("panicked: {msg}")),
            },
        }
    }
}
