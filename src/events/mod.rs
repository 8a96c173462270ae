//! Event envelope and kind registry.
//!
//! Every message on the bus is an [`Event`]: an immutable envelope around a
//! typed [`EventPayload`], tagged with an [`EventKind`], a correlation id and an
//! optional session id. Events are only constructed through
//! [`KindRegistry::make_event`], which rejects unregistered kinds and payloads
//! that fail the kind's validator.

mod envelope;
mod kind;
mod payload;
mod registry;

pub use envelope::Event;
pub use kind::EventKind;
pub use payload::{EventPayload, GenerationParameters, MetricsSample};
pub use registry::{KindRegistry, PayloadValidator};
