//! Restart, backoff and restart-budget policies.
//!
//! The delay before restart `n` (0-indexed, counted inside the current budget
//! window) is `first × factor^n`, clamped to `max`. The budget is a sliding
//! window: restarts older than `window` no longer count against
//! `max_restarts`. Without a limit, restarts still age out after
//! [`UNLIMITED_WINDOW`] so the backoff exponent resets once a component has
//! been quiet for a while.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use crate::types::{Error, Result};

/// Whether a component is relaunched after its run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Run once; failures are recorded but never retried.
    Never,
    /// Restart after errors and panics; a clean return stops the component.
    #[default]
    OnFailure,
    /// The component is expected to run forever; any exit is a failure.
    Always,
}

impl RestartPolicy {
    pub fn restarts_on_failure(self) -> bool {
        !matches!(self, RestartPolicy::Never)
    }
}

/// Exponential backoff between restarts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first restart.
    #[serde(with = "humantime_serde")]
    pub first: Duration,
    /// Upper bound on any delay.
    #[serde(with = "humantime_serde")]
    pub max: Duration,
    /// Multiplicative growth factor (>= 1.0).
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Fixed delay, no growth.
    pub fn constant(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
        }
    }

    /// Delay before restart number `n` (0-indexed).
    pub fn delay(&self, n: u32) -> Duration {
        let exp = n.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(Error::config(format!(
                "backoff factor must be >= 1.0, got {}",
                self.factor
            )));
        }
        if self.first > self.max {
            return Err(Error::config(format!(
                "backoff first ({:?}) exceeds max ({:?})",
                self.first, self.max
            )));
        }
        Ok(())
    }
}

/// At most `max_restarts` restarts within any `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartLimit {
    pub max_restarts: u32,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RestartLimit {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            window: Duration::from_secs(60),
        }
    }
}

impl RestartLimit {
    pub fn validate(&self) -> Result<()> {
        if self.window.is_zero() {
            return Err(Error::config("restart window must be > 0"));
        }
        Ok(())
    }
}

/// Window used for backoff accounting when no [`RestartLimit`] is set.
pub const UNLIMITED_WINDOW: Duration = Duration::from_secs(60);

/// Restart instants kept for an unlimited budget. Backoff has long saturated
/// by this exponent.
const MAX_TRACKED: usize = 64;

/// Sliding-window restart accounting for one component.
#[derive(Debug)]
pub(crate) struct RestartBudget {
    limit: Option<RestartLimit>,
    restarts: VecDeque<Instant>,
}

impl RestartBudget {
    pub(crate) fn new(limit: Option<RestartLimit>) -> Self {
        Self {
            limit,
            restarts: VecDeque::new(),
        }
    }

    fn window(&self) -> Duration {
        self.limit.map_or(UNLIMITED_WINDOW, |limit| limit.window)
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window();
        while let Some(&at) = self.restarts.front() {
            if now.saturating_duration_since(at) >= window {
                self.restarts.pop_front();
            } else {
                break;
            }
        }
    }

    /// Restarts that still count against the budget at `now`.
    pub(crate) fn in_window(&mut self, now: Instant) -> u32 {
        self.prune(now);
        self.restarts.len() as u32
    }

    /// Claim one restart at `now`.
    ///
    /// Returns how many restarts were already inside the window (the backoff
    /// exponent), or `None` when the budget is exhausted.
    pub(crate) fn try_acquire(&mut self, now: Instant) -> Option<u32> {
        let used = self.in_window(now);
        match self.limit {
            Some(limit) if used >= limit.max_restarts => return None,
            Some(_) => {}
            None if self.restarts.len() >= MAX_TRACKED => {
                self.restarts.pop_front();
            }
            None => {}
        }
        self.restarts.push_back(now);
        Some(used)
    }
}
