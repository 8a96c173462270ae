//! Consumer side of a subscription.

use futures::Stream;
use std::sync::Arc;

use super::queue::SubscriberQueue;
use super::registry::SubscriptionHandle;
use crate::events::{Event, EventKind};

/// Ordered view of one kind's events for exactly one subscriber.
///
/// Dropping the stream closes its queue; the registry prunes it on the next
/// publish. Use [`CommBus::unsubscribe`](super::CommBus::unsubscribe) to
/// remove it eagerly.
#[derive(Debug)]
pub struct EventStream {
    handle: SubscriptionHandle,
    queue: Arc<SubscriberQueue>,
}

impl EventStream {
    pub(crate) fn new(handle: SubscriptionHandle, queue: Arc<SubscriberQueue>) -> Self {
        Self { handle, queue }
    }

    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    pub fn kind(&self) -> EventKind {
        self.handle.kind()
    }

    /// Next event in publish order; `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.queue.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.queue.try_recv()
    }

    /// Events currently buffered for this subscriber.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adapt into a [`futures::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Event> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.recv().await.map(|event| (event, stream))
        })
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.queue.close();
    }
}
