//! Kind-specific event payloads.
//!
//! Payloads form a closed sum type: each variant belongs to exactly one
//! [`EventKind`], so a payload can never be routed under the wrong kind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::kind::EventKind;

/// Sampling parameters for a generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    #[serde(default)]
    pub stop: Vec<String>,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.7,
            top_p: 0.95,
            stop: Vec::new(),
        }
    }
}

/// Named numeric readings from one metrics source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSample {
    pub source: String,
    pub values: BTreeMap<String, f64>,
}

/// Typed event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "kebab-case")]
pub enum EventPayload {
    GenerationRequested {
        prompt: String,
        #[serde(default)]
        system_prompt: Option<String>,
        #[serde(default)]
        parameters: GenerationParameters,
        #[serde(default)]
        model_id: Option<String>,
    },
    GenerationCompleted {
        response: String,
        tokens_used: u32,
        generation_time_ms: u64,
        model_name: String,
    },
    ModelLoadRequested {
        model_id: String,
    },
    ModelLoaded {
        model_id: String,
        load_time_ms: u64,
    },
    SessionCleared {
        #[serde(default)]
        reason: Option<String>,
    },
    MetricsSample(MetricsSample),
    SpeechToText {
        text: String,
        confidence: f32,
        #[serde(default)]
        audio_duration_ms: Option<u64>,
    },
    TextToSpeech {
        text: String,
        voice_id: String,
    },
    ActionRequested {
        action_type: String,
        #[serde(default)]
        parameters: serde_json::Value,
    },
    StatusUpdate {
        component: String,
        #[serde(default)]
        status: serde_json::Value,
    },
}

impl EventPayload {
    /// The kind this payload belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::GenerationRequested { .. } => EventKind::GenerationRequested,
            EventPayload::GenerationCompleted { .. } => EventKind::GenerationCompleted,
            EventPayload::ModelLoadRequested { .. } => EventKind::ModelLoadRequested,
            EventPayload::ModelLoaded { .. } => EventKind::ModelLoaded,
            EventPayload::SessionCleared { .. } => EventKind::SessionCleared,
            EventPayload::MetricsSample(_) => EventKind::MetricsSample,
            EventPayload::SpeechToText { .. } => EventKind::SpeechToText,
            EventPayload::TextToSpeech { .. } => EventKind::TextToSpeech,
            EventPayload::ActionRequested { .. } => EventKind::ActionRequested,
            EventPayload::StatusUpdate { .. } => EventKind::StatusUpdate,
        }
    }

    /// Shorthand for a generation request with default parameters.
    pub fn generation_requested(prompt: impl Into<String>) -> Self {
        EventPayload::GenerationRequested {
            prompt: prompt.into(),
            system_prompt: None,
            parameters: GenerationParameters::default(),
            model_id: None,
        }
    }

    pub fn generation_completed(
        response: impl Into<String>,
        tokens_used: u32,
        generation_time_ms: u64,
        model_name: impl Into<String>,
    ) -> Self {
        EventPayload::GenerationCompleted {
            response: response.into(),
            tokens_used,
            generation_time_ms,
            model_name: model_name.into(),
        }
    }

    pub fn metrics_sample<K, I>(source: impl Into<String>, values: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, f64)>,
    {
        EventPayload::MetricsSample(MetricsSample {
            source: source.into(),
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        })
    }
}

/// Validators applied by [`KindRegistry::with_defaults`](super::KindRegistry::with_defaults).
pub(crate) mod defaults {
    use super::EventPayload;

    fn non_empty(field: &str, value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err(format!("{field} must not be empty"));
        }
        Ok(())
    }

    pub(crate) fn validate(payload: &EventPayload) -> Result<(), String> {
        match payload {
            EventPayload::GenerationRequested {
                prompt,
                parameters,
                model_id,
                ..
            } => {
                non_empty("prompt", prompt)?;
                if let Some(id) = model_id {
                    non_empty("model_id", id)?;
                }
                if !parameters.temperature.is_finite() || parameters.temperature < 0.0 {
                    return Err(format!(
                        "temperature must be >= 0, got {}",
                        parameters.temperature
                    ));
                }
                if !(parameters.top_p > 0.0 && parameters.top_p <= 1.0) {
                    return Err(format!("top_p must be in (0, 1], got {}", parameters.top_p));
                }
                if parameters.max_tokens == 0 {
                    return Err("max_tokens must be > 0".to_string());
                }
                Ok(())
            }
            EventPayload::GenerationCompleted { model_name, .. } => {
                non_empty("model_name", model_name)
            }
            EventPayload::ModelLoadRequested { model_id }
            | EventPayload::ModelLoaded { model_id, .. } => non_empty("model_id", model_id),
            EventPayload::SessionCleared { .. } => Ok(()),
            EventPayload::MetricsSample(sample) => {
                non_empty("source", &sample.source)?;
                match sample.values.iter().find(|(_, v)| !v.is_finite()) {
                    Some((name, value)) => Err(format!("metric {name} is not finite: {value}")),
                    None => Ok(()),
                }
            }
            EventPayload::SpeechToText {
                text, confidence, ..
            } => {
                non_empty("text", text)?;
                if !(0.0..=1.0).contains(confidence) {
                    return Err(format!("confidence must be in [0, 1], got {confidence}"));
                }
                Ok(())
            }
            EventPayload::TextToSpeech { text, voice_id } => {
                non_empty("text", text)?;
                non_empty("voice_id", voice_id)
            }
            EventPayload::ActionRequested { action_type, .. } => {
                non_empty("action_type", action_type)
            }
            EventPayload::StatusUpdate { component, .. } => non_empty("component", component),
        }
    }
}
