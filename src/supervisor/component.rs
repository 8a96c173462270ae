//! Supervised component contract.
//!
//! A component is an async entry point that the supervisor runs as its own
//! task. Every attempt receives a fresh [`ComponentContext`] carrying the
//! shared bus, a cancellation token and a readiness signal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;

use crate::commbus::{CommBus, EventStream, PublishOutcome};
use crate::events::{Event, EventKind, EventPayload};
use crate::types::{ComponentId, CorrelationId, Error, RestartConfig, Result};

/// Long-running subsystem managed by the supervisor.
///
/// `run` should return promptly once the context's cancellation token fires.
/// Returning `Err` or panicking counts as a failure.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    async fn run(&self, ctx: ComponentContext) -> Result<()>;
}

/// Closure-backed component. Each attempt calls the closure for a new future.
pub struct ComponentFn<F> {
    f: F,
}

impl<F> fmt::Debug for ComponentFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentFn").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Component for ComponentFn<F>
where
    F: Fn(ComponentContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn run(&self, ctx: ComponentContext) -> Result<()> {
        (self.f)(ctx).await
    }
}

/// Wrap a closure as a [`Component`].
pub fn component_fn<F, Fut>(f: F) -> ComponentFn<F>
where
    F: Fn(ComponentContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    ComponentFn { f }
}

/// When a starting component counts as running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessMode {
    /// As soon as the component's future first suspends.
    #[default]
    FirstYield,
    /// When the component calls [`ComponentContext::mark_ready`].
    Explicit,
}

/// Registration descriptor for one component.
pub struct ComponentSpec {
    id: ComponentId,
    component: Arc<dyn Component>,
    restart: Option<RestartConfig>,
    readiness: ReadinessMode,
}

impl ComponentSpec {
    /// Describe a component. Fails if `name` is empty.
    pub fn new(name: impl Into<String>, component: impl Component) -> Result<Self> {
        let id = ComponentId::from_string(name.into()).map_err(Error::validation)?;
        Ok(Self {
            id,
            component: Arc::new(component),
            restart: None,
            readiness: ReadinessMode::default(),
        })
    }

    /// Describe a closure-backed component.
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Result<Self>
    where
        F: Fn(ComponentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::new(name, component_fn(f))
    }

    /// Override the supervisor's restart settings for this component.
    pub fn with_restart(mut self, restart: RestartConfig) -> Self {
        self.restart = Some(restart);
        self
    }

    pub fn with_readiness(mut self, readiness: ReadinessMode) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn name(&self) -> &str {
        self.id.as_str()
    }

    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    pub fn readiness(&self) -> ReadinessMode {
        self.readiness
    }

    pub(crate) fn restart(&self) -> Option<RestartConfig> {
        self.restart
    }

    pub(crate) fn component(&self) -> Arc<dyn Component> {
        self.component.clone()
    }
}

impl fmt::Debug for ComponentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentSpec")
            .field("id", &self.id)
            .field("restart", &self.restart)
            .field("readiness", &self.readiness)
            .finish_non_exhaustive()
    }
}

/// One-shot readiness flag for a single attempt.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReadySignal {
    token: CancellationToken,
}

impl ReadySignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mark(&self) {
        self.token.cancel();
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) async fn wait(&self) {
        self.token.cancelled().await
    }
}

/// Marks the attempt ready the first time the wrapped future returns
/// `Pending`.
pub(crate) struct FirstYield<F> {
    inner: F,
    ready: Option<ReadySignal>,
}

impl<F> FirstYield<F> {
    pub(crate) fn new(inner: F, ready: ReadySignal) -> Self {
        Self {
            inner,
            ready: Some(ready),
        }
    }
}

impl<F> Future for FirstYield<F>
where
    F: Future + Unpin,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll(cx);
        if poll.is_pending() {
            if let Some(ready) = this.ready.take() {
                ready.mark();
            }
        }
        poll
    }
}

/// Per-attempt handle given to a running component.
#[derive(Clone)]
pub struct ComponentContext {
    id: ComponentId,
    attempt: u32,
    bus: Arc<CommBus>,
    cancel: CancellationToken,
    ready: ReadySignal,
}

impl ComponentContext {
    pub(crate) fn new(
        id: ComponentId,
        attempt: u32,
        bus: Arc<CommBus>,
        cancel: CancellationToken,
        ready: ReadySignal,
    ) -> Self {
        Self {
            id,
            attempt,
            bus,
            cancel,
            ready,
        }
    }

    pub fn name(&self) -> &str {
        self.id.as_str()
    }

    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    /// 1-based attempt number; greater than 1 after a restart.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn bus(&self) -> &Arc<CommBus> {
        &self.bus
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once shutdown has been requested.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Report readiness. Only meaningful with [`ReadinessMode::Explicit`];
    /// repeated calls are no-ops.
    pub fn mark_ready(&self) {
        self.ready.mark();
    }

    pub fn is_ready(&self) -> bool {
        self.ready.is_ready()
    }

    /// Subscribe this component to `kind`. The subscription is removed when
    /// the attempt ends.
    pub async fn subscribe(&self, kind: EventKind) -> Result<EventStream> {
        self.bus.subscribe(kind, &self.id).await
    }

    pub async fn publish(&self, event: Event) -> Result<PublishOutcome> {
        self.bus.publish(event).await
    }

    /// Build an event from `payload` and publish it.
    pub async fn emit(
        &self,
        payload: EventPayload,
        correlation_id: CorrelationId,
    ) -> Result<PublishOutcome> {
        let event = self
            .bus
            .make_event(payload.kind(), payload, correlation_id, None)?;
        self.bus.publish(event).await
    }
}

impl fmt::Debug for ComponentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentContext")
            .field("id", &self.id)
            .field("attempt", &self.attempt)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
