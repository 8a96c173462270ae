//! Subscription registry: which components listen to which kinds.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::queue::SubscriberQueue;
use crate::events::EventKind;
use crate::types::{ComponentId, SubscriptionId};

/// Receipt for one subscription, used to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    kind: EventKind,
    component: ComponentId,
}

impl SubscriptionHandle {
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn component(&self) -> &ComponentId {
        &self.component
    }
}

#[derive(Debug)]
struct Subscriber {
    id: SubscriptionId,
    component: ComponentId,
    queue: Arc<SubscriberQueue>,
}

/// Queue occupancy for one kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Depth {
    pub subscribers: usize,
    pub queued: usize,
}

/// Task-safe registry of live subscriptions.
///
/// Removal is idempotent: crash cleanup and explicit unsubscribe may race.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    /// kind -> subscribers, in subscription order
    subscribers: RwLock<HashMap<EventKind, Vec<Subscriber>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `component` for `kind` with a fresh queue of `capacity`.
    pub(crate) async fn add_subscriber(
        &self,
        kind: EventKind,
        component: ComponentId,
        capacity: usize,
    ) -> (SubscriptionHandle, Arc<SubscriberQueue>) {
        let queue = Arc::new(SubscriberQueue::new(capacity));
        let handle = SubscriptionHandle {
            id: SubscriptionId::new(),
            kind,
            component: component.clone(),
        };

        self.subscribers
            .write()
            .await
            .entry(kind)
            .or_default()
            .push(Subscriber {
                id: handle.id.clone(),
                component,
                queue: queue.clone(),
            });

        tracing::debug!(
            kind = %kind,
            component = %handle.component,
            subscription = %handle.id,
            "subscriber added"
        );
        (handle, queue)
    }

    /// Remove one subscription. Returns `false` if it was already gone.
    pub async fn remove_subscriber(&self, handle: &SubscriptionHandle) -> bool {
        let mut subscribers = self.subscribers.write().await;
        let Some(subs) = subscribers.get_mut(&handle.kind) else {
            return false;
        };

        let before = subs.len();
        subs.retain(|s| {
            if s.id == handle.id {
                s.queue.close();
                false
            } else {
                true
            }
        });
        let removed = subs.len() != before;

        if removed {
            tracing::debug!(kind = %handle.kind, subscription = %handle.id, "subscriber removed");
        }
        removed
    }

    /// Remove every subscription owned by `component`, across all kinds.
    pub async fn remove_component(&self, component: &ComponentId) -> usize {
        let mut subscribers = self.subscribers.write().await;
        let mut removed = 0;
        for subs in subscribers.values_mut() {
            subs.retain(|s| {
                if &s.component == component {
                    s.queue.close();
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        }

        if removed > 0 {
            tracing::debug!(component = %component, removed, "component subscriptions removed");
        }
        removed
    }

    /// Live queues for `kind`, pruning subscribers whose stream was dropped.
    pub(crate) async fn subscribers_of(&self, kind: EventKind) -> Vec<Arc<SubscriberQueue>> {
        {
            let subscribers = self.subscribers.read().await;
            match subscribers.get(&kind) {
                None => return Vec::new(),
                Some(subs) if subs.iter().all(|s| !s.queue.is_closed()) => {
                    return subs.iter().map(|s| s.queue.clone()).collect();
                }
                Some(_) => {}
            }
        }

        let mut subscribers = self.subscribers.write().await;
        let subs = subscribers.entry(kind).or_default();
        subs.retain(|s| !s.queue.is_closed());
        subs.iter().map(|s| s.queue.clone()).collect()
    }

    /// Total live subscriptions.
    pub async fn count(&self) -> usize {
        self.subscribers
            .read()
            .await
            .values()
            .flatten()
            .filter(|s| !s.queue.is_closed())
            .count()
    }

    pub async fn count_for(&self, kind: EventKind) -> usize {
        self.depth_for(kind).await.subscribers
    }

    pub(crate) async fn depth_for(&self, kind: EventKind) -> Depth {
        let subscribers = self.subscribers.read().await;
        subscribers
            .get(&kind)
            .map(|subs| {
                subs.iter()
                    .filter(|s| !s.queue.is_closed())
                    .fold(Depth::default(), |acc, s| Depth {
                        subscribers: acc.subscribers + 1,
                        queued: acc.queued + s.queue.len(),
                    })
            })
            .unwrap_or_default()
    }
}
