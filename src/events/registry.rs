//! Kind registry: maps each event kind to its payload validator.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::envelope::Event;
use super::kind::EventKind;
use super::payload::{defaults, EventPayload};
use crate::types::{CorrelationId, Error, Result, SessionId};

/// Validation function for one kind's payloads.
pub type PayloadValidator =
    Arc<dyn Fn(&EventPayload) -> std::result::Result<(), String> + Send + Sync>;

/// Registry of publishable event kinds.
///
/// Built once at startup and then shared read-only with the bus.
#[derive(Clone, Default)]
pub struct KindRegistry {
    validators: HashMap<EventKind, PayloadValidator>,
}

impl fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds = self.kinds();
        kinds.sort();
        f.debug_struct("KindRegistry").field("kinds", &kinds).finish()
    }
}

impl KindRegistry {
    /// Empty registry; nothing can be published until kinds are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in kind and its default validator.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for kind in EventKind::ALL {
            registry
                .validators
                .insert(kind, Arc::new(defaults::validate) as PayloadValidator);
        }
        registry
    }

    /// Associate `kind` with a validator.
    pub fn register_kind<F>(&mut self, kind: EventKind, validator: F) -> Result<()>
    where
        F: Fn(&EventPayload) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        if self.validators.contains_key(&kind) {
            return Err(Error::duplicate_kind(kind));
        }
        self.validators.insert(kind, Arc::new(validator));
        tracing::debug!(kind = %kind, "event kind registered");
        Ok(())
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.validators.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.validators.keys().copied().collect()
    }

    /// Check that `payload` belongs to `kind` and passes its validator.
    pub fn validate(&self, kind: EventKind, payload: &EventPayload) -> Result<()> {
        let validator = self
            .validators
            .get(&kind)
            .ok_or_else(|| Error::unknown_kind(kind))?;

        if payload.kind() != kind {
            return Err(Error::invalid_payload(
                kind,
                format!("payload belongs to {}", payload.kind()),
            ));
        }

        validator(payload).map_err(|reason| Error::invalid_payload(kind, reason))
    }

    /// Validate `payload` against `kind` and build the event.
    pub fn make_event(
        &self,
        kind: EventKind,
        payload: EventPayload,
        correlation_id: CorrelationId,
        session_id: Option<SessionId>,
    ) -> Result<Event> {
        self.validate(kind, &payload)?;
        Ok(Event::new(kind, payload, correlation_id, session_id))
    }
}
