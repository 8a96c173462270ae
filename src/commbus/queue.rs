//! Bounded per-subscriber event queue.
//!
//! Each subscription owns one queue, so a slow consumer only fills its own
//! buffer. The mutex is never held across an `.await`; waiting happens on the
//! two `Notify`s.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::events::Event;

/// Result of offering one event to one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Delivered,
    /// Delivered after evicting the oldest queued event.
    Evicted,
    TimedOut,
    /// Subscriber went away; nothing delivered.
    Closed,
}

#[derive(Debug)]
struct QueueState {
    buf: VecDeque<Event>,
    closed: bool,
}

#[derive(Debug)]
pub(crate) struct SubscriberQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    not_empty: Notify,
    not_full: Notify,
}

impl SubscriberQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(QueueState {
                buf: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Critical sections never panic mid-update, so a poisoned lock still
        // holds a consistent queue.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().buf.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Enqueue, evicting the oldest event when full. Never suspends.
    pub(crate) fn push_drop_oldest(&self, event: Event) -> PushOutcome {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return PushOutcome::Closed;
            }
            let evicted = if state.buf.len() >= self.capacity {
                state.buf.pop_front();
                true
            } else {
                false
            };
            state.buf.push_back(event);
            if evicted {
                PushOutcome::Evicted
            } else {
                PushOutcome::Delivered
            }
        };
        self.not_empty.notify_one();
        outcome
    }

    /// Enqueue if there is room; hands the event back when full.
    pub(crate) fn try_push(&self, event: Event) -> Result<PushOutcome, Event> {
        {
            let mut state = self.lock();
            if state.closed {
                return Ok(PushOutcome::Closed);
            }
            if state.buf.len() >= self.capacity {
                return Err(event);
            }
            state.buf.push_back(event);
        }
        self.not_empty.notify_one();
        Ok(PushOutcome::Delivered)
    }

    /// Enqueue, waiting for space until `deadline`.
    pub(crate) async fn push_until(&self, event: Event, deadline: Instant) -> PushOutcome {
        let mut event = event;
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a pop between the check
            // and the await is not missed.
            notified.as_mut().enable();

            event = match self.try_push(event) {
                Ok(outcome) => return outcome,
                Err(event) => event,
            };

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return PushOutcome::TimedOut;
            }
        }
    }

    /// Wait for the next event; `None` once the queue is closed and drained.
    pub(crate) async fn recv(&self) -> Option<Event> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(event) = state.buf.pop_front() {
                    drop(state);
                    self.not_full.notify_one();
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    pub(crate) fn try_recv(&self) -> Option<Event> {
        let event = self.lock().buf.pop_front();
        if event.is_some() {
            self.not_full.notify_one();
        }
        event
    }

    /// Stop accepting events and wake everyone waiting on this queue.
    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }
}
