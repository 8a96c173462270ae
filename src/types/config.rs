//! Configuration structures.
//!
//! Configuration is parsed by the caller (file, environment, CLI) and handed to
//! the core as plain values at construction time. The core never reads the
//! environment itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use super::errors::{Error, Result};
use crate::commbus::{ChannelConfig, DeliveryPolicy};
use crate::events::EventKind;
use crate::supervisor::{BackoffPolicy, RestartLimit, RestartPolicy};

/// Global configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Event bus channel configuration.
    #[serde(default)]
    pub bus: BusConfig,

    /// Component supervision configuration.
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

impl Config {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        self.bus.validate()?;
        self.supervisor.validate()
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Per-kind overrides. Unset fields fall back to the kind's built-in
/// settings, then to the bus-wide defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindConfig {
    pub capacity: Option<usize>,
    pub policy: Option<DeliveryPolicy>,
    /// Replay retention for late subscribers (0 = not durable).
    pub retain: Option<usize>,
}

impl KindConfig {
    /// Fields set in `other` win; unset ones keep `self`'s values.
    pub fn overlay(self, other: KindConfig) -> KindConfig {
        KindConfig {
            capacity: other.capacity.or(self.capacity),
            policy: other.policy.or(self.policy),
            retain: other.retain.or(self.retain),
        }
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Per-subscriber queue capacity when a kind sets none.
    pub default_capacity: usize,

    /// Delivery policy for request/response kinds without an override.
    pub default_policy: DeliveryPolicy,

    /// Per-kind overrides, merged over the built-in per-kind settings.
    #[serde(deserialize_with = "merge_kind_overrides")]
    pub kinds: BTreeMap<EventKind, KindConfig>,
}

impl Default for BusConfig {
    /// Telemetry kinds drop their oldest events; everything else blocks for up
    /// to five seconds. Metrics samples and status updates are durable.
    fn default() -> Self {
        Self {
            default_capacity: 64,
            default_policy: DeliveryPolicy::block_for(Duration::from_secs(5)),
            kinds: builtin_kinds(),
        }
    }
}

fn builtin_kinds() -> BTreeMap<EventKind, KindConfig> {
    EventKind::ALL
        .into_iter()
        .filter(|kind| kind.is_telemetry())
        .map(|kind| {
            let retain = match kind {
                EventKind::MetricsSample => 32,
                EventKind::StatusUpdate => 8,
                _ => 0,
            };
            (
                kind,
                KindConfig {
                    capacity: None,
                    policy: Some(DeliveryPolicy::DropOldest),
                    retain: Some(retain),
                },
            )
        })
        .collect()
}

fn merge_kind_overrides<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<EventKind, KindConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let overrides = BTreeMap::<EventKind, KindConfig>::deserialize(deserializer)?;
    let mut kinds = builtin_kinds();
    for (kind, config) in overrides {
        let merged = kinds.get(&kind).copied().unwrap_or_default().overlay(config);
        kinds.insert(kind, merged);
    }
    Ok(kinds)
}

impl BusConfig {
    /// Resolve the effective channel settings for `kind`.
    pub fn channel_for(&self, kind: EventKind) -> ChannelConfig {
        let overrides = self.kinds.get(&kind).copied().unwrap_or_default();
        ChannelConfig {
            capacity: overrides.capacity.unwrap_or(self.default_capacity),
            policy: overrides.policy.unwrap_or(self.default_policy),
            retain: overrides.retain.unwrap_or(0),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_capacity == 0 {
            return Err(Error::config("bus.default_capacity must be > 0"));
        }
        for kind in self.kinds.keys() {
            let channel = self.channel_for(*kind);
            if channel.capacity == 0 {
                return Err(Error::config(format!("bus.kinds.{kind}.capacity must be > 0")));
            }
            if channel.retain > channel.capacity {
                return Err(Error::config(format!(
                    "bus.kinds.{kind}.retain ({}) exceeds capacity ({})",
                    channel.retain, channel.capacity
                )));
            }
        }
        Ok(())
    }
}

/// Restart settings applied to a component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestartConfig {
    pub policy: RestartPolicy,
    pub backoff: BackoffPolicy,
    /// Sliding-window restart budget; `None` allows unlimited restarts, with
    /// backoff resetting after a quiet minute.
    #[serde(default)]
    pub limit: Option<RestartLimit>,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            policy: RestartPolicy::OnFailure,
            backoff: BackoffPolicy::default(),
            limit: Some(RestartLimit::default()),
        }
    }
}

impl RestartConfig {
    pub fn validate(&self) -> Result<()> {
        self.backoff.validate()?;
        if let Some(limit) = &self.limit {
            limit.validate()?;
        }
        Ok(())
    }
}

/// Component supervision configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Upper bound on how long `start_all` waits for components to settle.
    #[serde(with = "humantime_serde")]
    pub startup_timeout: Duration,

    /// Default bound for graceful shutdown before stragglers are aborted.
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Restart settings for components that do not specify their own.
    pub default_restart: RestartConfig,

    /// Per-component overrides, keyed by component name.
    pub components: BTreeMap<String, RestartConfig>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
            default_restart: RestartConfig::default(),
            components: BTreeMap::new(),
        }
    }
}

impl SupervisorConfig {
    /// Restart settings for `name`.
    pub fn restart_for(&self, name: &str) -> RestartConfig {
        self.components
            .get(name)
            .copied()
            .unwrap_or(self.default_restart)
    }

    pub fn validate(&self) -> Result<()> {
        if self.startup_timeout.is_zero() {
            return Err(Error::config("supervisor.startup_timeout must be > 0"));
        }
        self.default_restart.validate()?;
        for (name, restart) in &self.components {
            restart
                .validate()
                .map_err(|e| Error::config(format!("supervisor.components.{name}: {e}")))?;
        }
        Ok(())
    }
}
