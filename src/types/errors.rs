//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the Solo core.
#[derive(Error, Debug)]
pub enum Error {
    /// Event kind was never registered with the kind registry.
    #[error("unknown event kind: {0}")]
    UnknownKind(String),

    /// Payload rejected by the kind's validator (or belongs to another kind).
    #[error("invalid payload for {kind}: {reason}")]
    InvalidPayload { kind: String, reason: String },

    /// Event kind registered twice.
    #[error("event kind already registered: {0}")]
    DuplicateKind(String),

    /// Component name registered twice with the supervisor.
    #[error("component already registered: {0}")]
    DuplicateComponent(String),

    /// Generic caller-side validation failure.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid lifecycle state transition.
    #[error("state transition error: {0}")]
    StateTransition(String),

    /// Invalid configuration value.
    #[error("config error: {0}")]
    Config(String),

    /// Failure raised by supervised component code.
    #[error("component failed: {0}")]
    ComponentFailed(String),

    /// Cancellation requested by the supervisor.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error classification used for propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Caller mistakes: surfaced synchronously, never retried by the core.
    Contract,
    /// Backpressure outcomes the publisher decides how to handle.
    Capacity,
    /// Failures inside supervised component code.
    Component,
    /// Infrastructure faults.
    Internal,
}

impl Error {
    /// Classify the error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnknownKind(_)
            | Error::InvalidPayload { .. }
            | Error::DuplicateKind(_)
            | Error::DuplicateComponent(_)
            | Error::Validation(_)
            | Error::NotFound(_)
            | Error::StateTransition(_)
            | Error::Config(_) => ErrorCategory::Contract,
            Error::Timeout(_) => ErrorCategory::Capacity,
            Error::ComponentFailed(_) | Error::Cancelled(_) => ErrorCategory::Component,
            Error::Internal(_) | Error::Serialization(_) | Error::Io(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// True for errors caused by the caller violating an API contract.
    pub fn is_contract(&self) -> bool {
        self.category() == ErrorCategory::Contract
    }
}

// Convenience constructors
impl Error {
    pub fn unknown_kind(kind: impl ToString) -> Self {
        Self::UnknownKind(kind.to_string())
    }

    pub fn invalid_payload(kind: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }

    pub fn duplicate_kind(kind: impl ToString) -> Self {
        Self::DuplicateKind(kind.to_string())
    }

    pub fn duplicate_component(name: impl Into<String>) -> Self {
        Self::DuplicateComponent(name.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn state_transition(msg: impl Into<String>) -> Self {
        Self::StateTransition(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn component_failed(msg: impl Into<String>) -> Self {
        Self::ComponentFailed(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_errors_are_classified() {
        assert!(Error::unknown_kind("x").is_contract());
        assert!(Error::invalid_payload("x", "bad").is_contract());
        assert!(Error::duplicate_kind("x").is_contract());
        assert!(Error::duplicate_component("generator").is_contract());
        assert_eq!(Error::timeout("full").category(), ErrorCategory::Capacity);
        assert_eq!(
            Error::component_failed("boom").category(),
            ErrorCategory::Component
        );
    }

    #[test]
    fn test_display_includes_context() {
        let err = Error::invalid_payload("generation-requested", "prompt is empty");
        assert_eq!(
            err.to_string(),
            "invalid payload for generation-requested: prompt is empty"
        );
    }
}
