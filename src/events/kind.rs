//! Event kind discriminator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::Error;

/// Discriminator identifying an event's payload schema and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    GenerationRequested,
    GenerationCompleted,
    ModelLoadRequested,
    ModelLoaded,
    SessionCleared,
    MetricsSample,
    SpeechToText,
    TextToSpeech,
    ActionRequested,
    StatusUpdate,
}

impl EventKind {
    /// Every built-in kind, in declaration order.
    pub const ALL: [EventKind; 10] = [
        EventKind::GenerationRequested,
        EventKind::GenerationCompleted,
        EventKind::ModelLoadRequested,
        EventKind::ModelLoaded,
        EventKind::SessionCleared,
        EventKind::MetricsSample,
        EventKind::SpeechToText,
        EventKind::TextToSpeech,
        EventKind::ActionRequested,
        EventKind::StatusUpdate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::GenerationRequested => "generation-requested",
            EventKind::GenerationCompleted => "generation-completed",
            EventKind::ModelLoadRequested => "model-load-requested",
            EventKind::ModelLoaded => "model-loaded",
            EventKind::SessionCleared => "session-cleared",
            EventKind::MetricsSample => "metrics-sample",
            EventKind::SpeechToText => "speech-to-text",
            EventKind::TextToSpeech => "text-to-speech",
            EventKind::ActionRequested => "action-requested",
            EventKind::StatusUpdate => "status-update",
        }
    }

    /// Telemetry-style kinds: high volume, latest value matters most.
    pub fn is_telemetry(self) -> bool {
        matches!(
            self,
            EventKind::MetricsSample | EventKind::StatusUpdate | EventKind::SpeechToText
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::unknown_kind(s))
    }
}
