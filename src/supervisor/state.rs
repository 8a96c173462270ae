//! Component lifecycle state and run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::policy::RestartPolicy;
use crate::types::{Error, Result};

/// Component lifecycle state.
///
/// State transitions:
/// ```text
/// REGISTERED → STARTING → RUNNING → {FAILED | STOPPED}
///     ↓            ↓                    ↓
///  STOPPED    {FAILED | STOPPED}   RESTARTING → {STARTING | STOPPED}
/// ```
/// `FAILED` moves to `RESTARTING` or `STOPPED`. `STOPPED` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Registered,
    Starting,
    Running,
    Failed,
    Restarting,
    Stopped,
}

impl ComponentState {
    pub fn is_terminal(self) -> bool {
        self == ComponentState::Stopped
    }

    /// Check if transition is valid.
    pub fn can_transition_to(self, to: ComponentState) -> bool {
        use ComponentState::*;
        match (self, to) {
            // REGISTERED
            (Registered, Starting) => true,
            (Registered, Stopped) => true, // shut down before launch
            // STARTING
            (Starting, Running) => true,
            (Starting, Failed) => true,
            (Starting, Stopped) => true,
            // RUNNING
            (Running, Failed) => true,
            (Running, Stopped) => true,
            // FAILED
            (Failed, Restarting) => true,
            (Failed, Stopped) => true,
            // RESTARTING
            (Restarting, Starting) => true,
            (Restarting, Stopped) => true,
            // STOPPED is terminal
            (Stopped, _) => false,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentState::Registered => "registered",
            ComponentState::Starting => "starting",
            ComponentState::Running => "running",
            ComponentState::Failed => "failed",
            ComponentState::Restarting => "restarting",
            ComponentState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for ComponentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Most recent failure of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Supervisor-owned bookkeeping for one component.
///
/// Readers only ever see copies taken from a status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub name: String,
    pub state: ComponentState,
    pub policy: RestartPolicy,
    /// 1-based number of the current (or last) attempt; 0 before launch.
    pub attempt: u32,
    pub started_at: Option<DateTime<Utc>>,
    /// Restarts performed over the component's lifetime.
    pub restart_count: u32,
    /// Restarts inside the budget window as of the most recent restart. Not
    /// recomputed as the window slides.
    pub restarts_in_window: u32,
    /// Most recent failure, kept after a successful restart for display.
    pub last_failure: Option<FailureInfo>,
    /// Whether the latest attempt ended in failure.
    #[serde(default)]
    pub last_attempt_failed: bool,
    /// Delay of the currently scheduled restart, if any.
    #[serde(default, with = "humantime_serde")]
    pub next_restart_in: Option<Duration>,
    /// Set when the component was aborted at shutdown.
    pub unclean: bool,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    pub(crate) fn new(name: impl Into<String>, policy: RestartPolicy) -> Self {
        Self {
            name: name.into(),
            state: ComponentState::Registered,
            policy,
            attempt: 0,
            started_at: None,
            restart_count: 0,
            restarts_in_window: 0,
            last_failure: None,
            last_attempt_failed: false,
            next_restart_in: None,
            unclean: false,
            updated_at: Utc::now(),
        }
    }

    /// Whether the component is stopped and its latest attempt ended without
    /// failure or forced abort. Earlier, recovered failures do not count.
    pub fn stopped_cleanly(&self) -> bool {
        self.state == ComponentState::Stopped && !self.unclean && !self.last_attempt_failed
    }

    /// Apply one change, enforcing the lifecycle state machine.
    pub(crate) fn apply(&mut self, change: &RecordChange) -> Result<()> {
        let now = Utc::now();

        if let RecordChange::ForceStopped = change {
            self.state = ComponentState::Stopped;
            self.unclean = true;
            self.next_restart_in = None;
            self.updated_at = now;
            return Ok(());
        }

        let to = change.target();
        if !self.state.can_transition_to(to) {
            return Err(Error::state_transition(format!(
                "cannot move {} to {}: state is {}",
                self.name, to, self.state
            )));
        }

        match change {
            RecordChange::Starting { attempt } => {
                self.attempt = *attempt;
                self.started_at = Some(now);
                self.last_attempt_failed = false;
                self.next_restart_in = None;
            }
            RecordChange::Failed { reason } => {
                self.last_failure = Some(FailureInfo {
                    reason: reason.clone(),
                    at: now,
                });
                self.last_attempt_failed = true;
            }
            RecordChange::Restarting {
                delay,
                restarts_in_window,
            } => {
                self.restart_count += 1;
                self.restarts_in_window = *restarts_in_window;
                self.next_restart_in = Some(*delay);
            }
            RecordChange::Running | RecordChange::Stopped => {
                self.next_restart_in = None;
            }
            RecordChange::ForceStopped => {}
        }

        self.state = to;
        self.updated_at = now;
        Ok(())
    }
}

/// A single update sent to the record table.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RecordChange {
    Starting { attempt: u32 },
    Running,
    Failed { reason: String },
    Restarting { delay: Duration, restarts_in_window: u32 },
    Stopped,
    /// Aborted after ignoring cancellation. Valid from any state.
    ForceStopped,
}

impl RecordChange {
    fn target(&self) -> ComponentState {
        match self {
            RecordChange::Starting { .. } => ComponentState::Starting,
            RecordChange::Running => ComponentState::Running,
            RecordChange::Failed { .. } => ComponentState::Failed,
            RecordChange::Restarting { .. } => ComponentState::Restarting,
            RecordChange::Stopped | RecordChange::ForceStopped => ComponentState::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_validation() {
        use ComponentState::*;
        assert!(Registered.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
        assert!(Starting.can_transition_to(Failed));
        assert!(Running.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Restarting));
        assert!(Restarting.can_transition_to(Starting));
        assert!(Restarting.can_transition_to(Stopped));

        assert!(!Registered.can_transition_to(Running));
        assert!(!Running.can_transition_to(Restarting));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Stopped.can_transition_to(Starting));
        assert!(Stopped.is_terminal());
    }

    #[test]
    fn test_restart_cycle_updates_counters() {
        let mut record = RunRecord::new("generator", RestartPolicy::OnFailure);
        record.apply(&RecordChange::Starting { attempt: 1 }).unwrap();
        record
            .apply(&RecordChange::Failed {
                reason: "model file missing".to_string(),
            })
            .unwrap();
        record
            .apply(&RecordChange::Restarting {
                delay: Duration::from_millis(500),
                restarts_in_window: 1,
            })
            .unwrap();

        assert_eq!(record.state, ComponentState::Restarting);
        assert_eq!(record.restart_count, 1);
        assert_eq!(record.next_restart_in, Some(Duration::from_millis(500)));

        record.apply(&RecordChange::Starting { attempt: 2 }).unwrap();
        assert_eq!(record.attempt, 2);
        assert_eq!(record.next_restart_in, None);
        assert_eq!(
            record.last_failure.as_ref().map(|f| f.reason.as_str()),
            Some("model file missing")
        );
        assert!(!record.stopped_cleanly());
    }

    #[test]
    fn test_recovered_failure_stops_cleanly() {
        let mut record = RunRecord::new("listener", RestartPolicy::OnFailure);
        record.apply(&RecordChange::Starting { attempt: 1 }).unwrap();
        record
            .apply(&RecordChange::Failed {
                reason: "microphone busy".to_string(),
            })
            .unwrap();
        record
            .apply(&RecordChange::Restarting {
                delay: Duration::from_millis(100),
                restarts_in_window: 1,
            })
            .unwrap();
        record.apply(&RecordChange::Starting { attempt: 2 }).unwrap();
        record.apply(&RecordChange::Running).unwrap();
        assert_eq!(record.restarts_in_window, 1);

        record.apply(&RecordChange::Stopped).unwrap();
        assert!(record.stopped_cleanly());
        assert!(record.last_failure.is_some());
    }

    #[test]
    fn test_final_failure_is_not_clean() {
        let mut record = RunRecord::new("generator", RestartPolicy::Never);
        record.apply(&RecordChange::Starting { attempt: 1 }).unwrap();
        record
            .apply(&RecordChange::Failed {
                reason: "out of memory".to_string(),
            })
            .unwrap();
        record.apply(&RecordChange::Stopped).unwrap();
        assert!(!record.stopped_cleanly());
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut record = RunRecord::new("persistence", RestartPolicy::Never);
        let err = record.apply(&RecordChange::Running).unwrap_err();
        assert!(matches!(err, Error::StateTransition(_)));
        assert_eq!(record.state, ComponentState::Registered);

        record.apply(&RecordChange::Stopped).unwrap();
        assert!(record.apply(&RecordChange::Starting { attempt: 1 }).is_err());
        assert!(record.stopped_cleanly());
    }

    #[test]
    fn test_force_stop_marks_unclean() {
        let mut record = RunRecord::new("stubborn", RestartPolicy::OnFailure);
        record.apply(&RecordChange::Starting { attempt: 1 }).unwrap();
        record.apply(&RecordChange::Running).unwrap();
        record.apply(&RecordChange::ForceStopped).unwrap();
        record.apply(&RecordChange::ForceStopped).unwrap();

        assert_eq!(record.state, ComponentState::Stopped);
        assert!(record.unclean);
        assert!(!record.stopped_cleanly());
    }
}
