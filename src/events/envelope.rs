//! Immutable event envelope.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;

use super::kind::EventKind;
use super::payload::EventPayload;
use crate::types::{CorrelationId, EventId, SessionId};

/// A published event.
///
/// Only [`KindRegistry::make_event`](super::KindRegistry::make_event) builds
/// events, so every instance carries a validated payload. Events serialize
/// for logging and status output but never deserialize; inbound data goes
/// through `make_event`. Clones share the payload.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    id: EventId,
    kind: EventKind,
    payload: Arc<EventPayload>,
    correlation_id: CorrelationId,
    session_id: Option<SessionId>,
    created_at: DateTime<Utc>,
    #[serde(skip)]
    created_instant: Instant,
}

impl Event {
    pub(crate) fn new(
        kind: EventKind,
        payload: EventPayload,
        correlation_id: CorrelationId,
        session_id: Option<SessionId>,
    ) -> Self {
        Self {
            id: EventId::new(),
            kind,
            payload: Arc::new(payload),
            correlation_id,
            session_id,
            created_at: Utc::now(),
            created_instant: Instant::now(),
        }
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Wall-clock creation time (display only; may jump).
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Monotonic creation time.
    pub fn created_instant(&self) -> Instant {
        self.created_instant
    }
}
