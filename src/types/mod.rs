//! Core types for the Solo runtime.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (CorrelationId, ComponentId, etc.)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for the bus, supervisor and logging

mod config;
mod errors;
mod ids;

pub use config::{
    BusConfig, Config, KindConfig, ObservabilityConfig, RestartConfig, SupervisorConfig,
};
pub use errors::{Error, ErrorCategory, Result};
pub use ids::{ComponentId, CorrelationId, EventId, SessionId, SubscriptionId};
