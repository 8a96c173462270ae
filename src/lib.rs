//! # Solo Core - Event Bus and Component Supervision
//!
//! In-process messaging and task supervision for the Solo local assistant:
//! - Typed event envelopes validated against a kind registry
//! - Per-kind bounded fan-out channels with explicit backpressure policy
//! - Replay of recent events for durable kinds
//! - Component supervision with restart policies, backoff and restart budgets
//! - Coordinated shutdown with unclean-exit reporting
//! - Health read model over run records, bus counters and metrics samples
//!
//! ## Architecture
//!
//! Components never reference each other; all traffic flows through the bus:
//! ```text
//!                    ┌─────────────────────────────────┐
//!   API layer    →   │             CommBus             │  → persistence
//!   (make_event,     │  ┌──────────┐  ┌─────────────┐  │    (subscribe)
//!    publish)        │  │  Kinds   │  │Subscriptions│  │
//!                    │  └──────────┘  └─────────────┘  │
//!                    └────────────────┬────────────────┘
//!                                     │
//!                    ┌────────────────┴────────────────┐
//!                    │           Supervisor            │  → HealthAggregator
//!                    │  actor per component, records   │    (get_status)
//!                    └─────────────────────────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod commbus;
pub mod events;
pub mod health;
pub mod supervisor;
pub mod types;

// Internal utilities
pub mod observability;

pub use commbus::{CommBus, EventStream, PublishOutcome};
pub use events::{Event, EventKind, EventPayload, KindRegistry};
pub use health::{HealthAggregator, HealthReport, HealthStatus};
pub use supervisor::{ComponentContext, ComponentSpec, Supervisor};
pub use types::{Config, Error, Result};
