//! Panic capture for component attempts.
//!
//! Each attempt runs in its own Tokio task, so a panic surfaces as a
//! [`JoinError`] instead of unwinding through the supervisor. These helpers
//! turn that into a failure reason for the run record.

use std::any::Any;
use tokio::task::JoinError;

/// How an attempt task ended, from the supervisor's point of view.
#[derive(Debug)]
pub(crate) enum TaskExit {
    /// The task panicked; carries the panic message.
    Panicked(String),
    /// The task was aborted through its abort handle.
    Aborted,
}

impl From<JoinError> for TaskExit {
    fn from(err: JoinError) -> Self {
        if err.is_cancelled() {
            return TaskExit::Aborted;
        }
        match err.try_into_panic() {
            Ok(payload) => TaskExit::Panicked(panic_message(&payload)),
            Err(err) => TaskExit::Panicked(err.to_string()),
        }
    }
}

/// Extract panic message from panic payload.
pub(crate) fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic (no message)".to_string()
    }
}
