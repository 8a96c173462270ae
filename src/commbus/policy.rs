//! Per-kind delivery policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What `publish` does when a subscriber's queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum DeliveryPolicy {
    /// Evict the subscriber's oldest queued event. Never suspends.
    DropOldest,
    /// Wait up to `timeout` for space, then give up on that subscriber.
    BlockWithTimeout {
        #[serde(with = "humantime_serde")]
        timeout: Duration,
    },
}

impl DeliveryPolicy {
    pub fn block_for(timeout: Duration) -> Self {
        DeliveryPolicy::BlockWithTimeout { timeout }
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        DeliveryPolicy::BlockWithTimeout {
            timeout: Duration::from_secs(5),
        }
    }
}

/// Resolved settings for one kind's channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Per-subscriber queue capacity.
    pub capacity: usize,
    pub policy: DeliveryPolicy,
    /// Number of recent events replayed to late subscribers (0 = not durable).
    pub retain: usize,
}

impl ChannelConfig {
    pub fn is_durable(&self) -> bool {
        self.retain > 0
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            policy: DeliveryPolicy::default(),
            retain: 0,
        }
    }
}
