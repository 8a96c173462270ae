//! Communication bus for typed pub/sub between components.
//!
//! All inter-component traffic flows through the bus, enabling:
//!   - Per-kind backpressure policy (drop-oldest or block-with-timeout)
//!   - Replay of recent events for durable kinds
//!   - Full tracing and delivery statistics
//!   - Fault isolation (one slow subscriber only fills its own queue)
//!
//! Delivery is fan-out: every subscriber of a kind gets its own FIFO view of
//! that kind's events. No ordering is promised across kinds.

mod policy;
mod queue;
mod registry;
mod stream;

pub use policy::{ChannelConfig, DeliveryPolicy};
pub use registry::{SubscriptionHandle, SubscriptionRegistry};
pub use stream::EventStream;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::events::{Event, EventKind, EventPayload, KindRegistry};
use crate::types::{BusConfig, ComponentId, CorrelationId, Error, Result, SessionId};
use queue::PushOutcome;

// =============================================================================
// Publish outcome
// =============================================================================

/// What happened to a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// Enqueued for every live subscriber (possibly zero).
    Accepted { delivered: usize },
    /// Enqueued everywhere, but older events were evicted to make room.
    Dropped { delivered: usize, evicted: usize },
    /// Some subscribers stayed full past the kind's timeout and missed it.
    TimedOut { delivered: usize, timed_out: usize },
}

impl PublishOutcome {
    pub fn delivered(&self) -> usize {
        match *self {
            PublishOutcome::Accepted { delivered }
            | PublishOutcome::Dropped { delivered, .. }
            | PublishOutcome::TimedOut { delivered, .. } => delivered,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, PublishOutcome::Accepted { .. })
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    evicted: AtomicU64,
    timed_out: AtomicU64,
}

impl Counters {
    fn record(&self, delivered: usize, evicted: usize, timed_out: usize) {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
        self.timed_out.fetch_add(timed_out as u64, Ordering::Relaxed);
    }
}

/// Statistics for one kind's channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindStats {
    pub kind: EventKind,
    pub config: ChannelConfig,
    pub published: u64,
    pub delivered: u64,
    pub evicted: u64,
    pub timed_out: u64,
    pub subscribers: usize,
    pub queue_depth: usize,
    pub retained: usize,
}

/// Statistics about bus usage.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusStats {
    pub events_published: u64,
    pub events_delivered: u64,
    pub events_dropped: u64,
    pub events_timed_out: u64,
    pub events_rejected: u64,
    pub active_subscribers: usize,
    pub queue_depth: usize,
    pub kinds: Vec<KindStats>,
}

// =============================================================================
// CommBus
// =============================================================================

#[derive(Debug)]
struct Channel {
    config: ChannelConfig,
    /// Replay buffer; also serializes subscribe against publish for this kind.
    gate: Mutex<VecDeque<Event>>,
    counters: Counters,
}

fn clamp_channel(kind: EventKind, mut config: ChannelConfig) -> ChannelConfig {
    if config.capacity == 0 {
        tracing::warn!(kind = %kind, "channel capacity is 0, using 1");
        config.capacity = 1;
    }
    if config.retain > config.capacity {
        tracing::warn!(
            kind = %kind,
            retain = config.retain,
            capacity = config.capacity,
            "retention exceeds capacity, capping it"
        );
        config.retain = config.capacity;
    }
    config
}

/// In-memory event bus.
///
/// Constructed explicitly and shared as `Arc<CommBus>`; there is no global
/// instance. The set of kinds is fixed by the [`KindRegistry`] given at
/// construction.
#[derive(Debug)]
pub struct CommBus {
    kinds: KindRegistry,
    channels: HashMap<EventKind, Channel>,
    subscriptions: SubscriptionRegistry,
    totals: Counters,
    rejected: AtomicU64,
}

impl CommBus {
    /// Create a bus carrying every kind registered in `kinds`.
    ///
    /// Channel settings that fail [`BusConfig::validate`] are clamped (zero
    /// capacity becomes 1, retention is capped at capacity) and logged. Use
    /// [`try_new`](Self::try_new) to reject them instead.
    pub fn new(kinds: KindRegistry, config: &BusConfig) -> Self {
        let channels = kinds
            .kinds()
            .into_iter()
            .map(|kind| {
                let config = clamp_channel(kind, config.channel_for(kind));
                (
                    kind,
                    Channel {
                        config,
                        gate: Mutex::new(VecDeque::with_capacity(config.retain)),
                        counters: Counters::default(),
                    },
                )
            })
            .collect();

        Self {
            kinds,
            channels,
            subscriptions: SubscriptionRegistry::new(),
            totals: Counters::default(),
            rejected: AtomicU64::new(0),
        }
    }

    /// Like [`new`](Self::new), but fails on an invalid configuration.
    pub fn try_new(kinds: KindRegistry, config: &BusConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(kinds, config))
    }

    /// Bus with the built-in kinds and default channel settings.
    pub fn with_defaults() -> Self {
        Self::new(KindRegistry::with_defaults(), &BusConfig::default())
    }

    pub fn kinds(&self) -> &KindRegistry {
        &self.kinds
    }

    /// Build a validated event for this bus. See [`KindRegistry::make_event`].
    pub fn make_event(
        &self,
        kind: EventKind,
        payload: EventPayload,
        correlation_id: CorrelationId,
        session_id: Option<SessionId>,
    ) -> Result<Event> {
        self.kinds
            .make_event(kind, payload, correlation_id, session_id)
    }

    pub fn channel_config(&self, kind: EventKind) -> Option<ChannelConfig> {
        self.channels.get(&kind).map(|c| c.config)
    }

    fn channel(&self, kind: EventKind) -> Result<&Channel> {
        self.channels.get(&kind).ok_or_else(|| {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            Error::unknown_kind(kind)
        })
    }

    // =========================================================================
    // Event Pub/Sub
    // =========================================================================

    /// Publish an event to all current subscribers of its kind.
    ///
    /// Fan-out: every subscriber receives the event in its own queue. With
    /// zero subscribers this is a no-op delivery (the event is still kept in
    /// the replay buffer of a durable kind).
    pub async fn publish(&self, event: Event) -> Result<PublishOutcome> {
        let kind = event.kind();
        let channel = self.channel(kind)?;
        // Events built against another registry must still pass this bus's
        // validators.
        if let Err(err) = self.kinds.validate(kind, event.payload()) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(kind = %kind, error = %err, "rejected invalid event");
            return Err(err);
        }

        let targets = {
            let mut replay = channel.gate.lock().await;
            if channel.config.is_durable() {
                replay.push_back(event.clone());
                while replay.len() > channel.config.retain {
                    replay.pop_front();
                }
            }
            self.subscriptions.subscribers_of(kind).await
        };

        let (mut delivered, mut evicted, mut timed_out) = (0usize, 0usize, 0usize);
        let mut tally = |outcome: PushOutcome| match outcome {
            PushOutcome::Delivered => delivered += 1,
            PushOutcome::Evicted => {
                delivered += 1;
                evicted += 1;
            }
            PushOutcome::TimedOut => timed_out += 1,
            PushOutcome::Closed => {}
        };

        match channel.config.policy {
            DeliveryPolicy::DropOldest => {
                for queue in &targets {
                    tally(queue.push_drop_oldest(event.clone()));
                }
            }
            DeliveryPolicy::BlockWithTimeout { timeout } => {
                let deadline = Instant::now() + timeout;
                let mut full = Vec::new();
                for queue in &targets {
                    match queue.try_push(event.clone()) {
                        Ok(outcome) => tally(outcome),
                        Err(event) => full.push((queue.clone(), event)),
                    }
                }

                // Subscribers with room already have the event; only the full
                // ones are waited on, concurrently, against one deadline.
                if !full.is_empty() {
                    let waits = full
                        .into_iter()
                        .map(|(queue, event)| async move { queue.push_until(event, deadline).await });
                    for outcome in futures::future::join_all(waits).await {
                        tally(outcome);
                    }
                }
            }
        }

        channel.counters.record(delivered, evicted, timed_out);
        self.totals.record(delivered, evicted, timed_out);

        let outcome = if timed_out > 0 {
            tracing::warn!(
                kind = %kind,
                correlation_id = %event.correlation_id(),
                delivered,
                timed_out,
                "publish timed out for full subscribers"
            );
            PublishOutcome::TimedOut {
                delivered,
                timed_out,
            }
        } else if evicted > 0 {
            tracing::warn!(kind = %kind, delivered, evicted, "evicted oldest events from full subscribers");
            PublishOutcome::Dropped { delivered, evicted }
        } else {
            PublishOutcome::Accepted { delivered }
        };

        tracing::debug!(
            kind = %kind,
            correlation_id = %event.correlation_id(),
            delivered,
            "published event"
        );

        Ok(outcome)
    }

    /// Subscribe `component` to `kind`.
    ///
    /// For durable kinds the retained events are queued first, so the
    /// subscriber sees them before anything published afterwards.
    pub async fn subscribe(&self, kind: EventKind, component: &ComponentId) -> Result<EventStream> {
        let channel = self.channel(kind)?;

        let replay = channel.gate.lock().await;
        let (handle, queue) = self
            .subscriptions
            .add_subscriber(kind, component.clone(), channel.config.capacity)
            .await;
        for event in replay.iter() {
            queue.push_drop_oldest(event.clone());
        }
        let replayed = replay.len();
        drop(replay);

        tracing::debug!(
            kind = %kind,
            component = %component,
            replayed,
            "subscribed"
        );

        Ok(EventStream::new(handle, queue))
    }

    /// Remove one subscription. Idempotent.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.subscriptions.remove_subscriber(handle).await
    }

    /// Remove every subscription owned by `component`. Idempotent.
    pub async fn remove_component(&self, component: &ComponentId) -> usize {
        self.subscriptions.remove_component(component).await
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    /// Copy of the replay buffer for `kind`, oldest first. Empty for
    /// non-durable or unknown kinds.
    pub async fn retained(&self, kind: EventKind) -> Vec<Event> {
        match self.channels.get(&kind) {
            Some(channel) => channel.gate.lock().await.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Current statistics for one kind.
    pub async fn kind_stats(&self, kind: EventKind) -> Option<KindStats> {
        let channel = self.channels.get(&kind)?;
        let depth = self.subscriptions.depth_for(kind).await;
        let retained = channel.gate.lock().await.len();

        Some(KindStats {
            kind,
            config: channel.config,
            published: channel.counters.published.load(Ordering::Relaxed),
            delivered: channel.counters.delivered.load(Ordering::Relaxed),
            evicted: channel.counters.evicted.load(Ordering::Relaxed),
            timed_out: channel.counters.timed_out.load(Ordering::Relaxed),
            subscribers: depth.subscribers,
            queue_depth: depth.queued,
            retained,
        })
    }

    /// Current bus statistics.
    pub async fn stats(&self) -> BusStats {
        let mut kinds_sorted = self.channels.keys().copied().collect::<Vec<_>>();
        kinds_sorted.sort();

        let mut kinds = Vec::with_capacity(kinds_sorted.len());
        for kind in kinds_sorted {
            if let Some(stats) = self.kind_stats(kind).await {
                kinds.push(stats);
            }
        }

        BusStats {
            events_published: self.totals.published.load(Ordering::Relaxed),
            events_delivered: self.totals.delivered.load(Ordering::Relaxed),
            events_dropped: self.totals.evicted.load(Ordering::Relaxed),
            events_timed_out: self.totals.timed_out.load(Ordering::Relaxed),
            events_rejected: self.rejected.load(Ordering::Relaxed),
            active_subscribers: kinds.iter().map(|k| k.subscribers).sum(),
            queue_depth: kinds.iter().map(|k| k.queue_depth).sum(),
            kinds,
        }
    }
}

impl Default for CommBus {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// =============================================================================
// Tests
// =============================================================================
