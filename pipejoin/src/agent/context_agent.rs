//! Single-resolution context agent.

use super::{Agent, AgentStatus, StopHooks};
use crate::cancellation::CancellationToken;
use crate::errors::{PipeError, PipeResult};
use crate::events::{default_sink, event_types, EventSink};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

type Slot<T> = Option<PipeResult<Arc<T>>>;

/// Exposes a context that becomes available at most once, a completion
/// signal raised by its consumer, and a stop operation releasing it.
///
/// The first of [`created`](Self::created), [`canceled`](Self::canceled) or
/// [`faulted`](Self::faulted) wins; later calls return `false` and leave the
/// observed result untouched.
pub struct ContextAgent<T> {
    id: Uuid,
    name: String,
    result: watch::Sender<Slot<T>>,
    completed: watch::Sender<bool>,
    stopped: watch::Sender<bool>,
    stopping: AtomicBool,
    stop_reason: RwLock<Option<String>>,
    hooks: StopHooks,
    created_at: DateTime<Utc>,
    events: Arc<dyn EventSink>,
}

impl<T: Send + Sync + 'static> ContextAgent<T> {
    /// Creates an unresolved agent.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            result: watch::Sender::new(None),
            completed: watch::Sender::new(false),
            stopped: watch::Sender::new(false),
            stopping: AtomicBool::new(false),
            stop_reason: RwLock::new(None),
            hooks: StopHooks::new(),
            created_at: Utc::now(),
            events: default_sink(),
        }
    }

    /// Sets the sink receiving this agent's lifecycle events.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Replaces the stop hooks, e.g. to change the per-hook timeout.
    #[must_use]
    pub fn with_stop_hooks(mut self, hooks: StopHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Returns when the agent was created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Resolves the agent with a context.
    pub fn created(&self, context: Arc<T>) -> bool {
        self.resolve(Ok(context))
    }

    /// Resolves the agent as canceled.
    pub fn canceled(&self, reason: impl Into<String>) -> bool {
        self.resolve(Err(PipeError::Cancelled(reason.into())))
    }

    /// Resolves the agent as faulted.
    pub fn faulted(&self, error: PipeError) -> bool {
        self.resolve(Err(error))
    }

    /// Resolves the agent with an outcome, routing cancellation errors to
    /// the canceled state.
    pub fn resolve(&self, outcome: PipeResult<Arc<T>>) -> bool {
        let (event_type, data) = match &outcome {
            Ok(_) => (event_types::AGENT_CREATED, self.event_data(None)),
            Err(e) if e.is_cancelled() => (event_types::AGENT_CANCELED, self.event_data(Some(e))),
            Err(e) => (event_types::AGENT_FAULTED, self.event_data(Some(e))),
        };

        let applied = self.result.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        });

        if applied {
            self.events.try_emit(event_type, Some(data));
        } else {
            debug!(agent = %self.name, attempted = event_type, "Ignoring resolution of an already resolved agent");
        }

        applied
    }

    /// Returns the resolved outcome without waiting.
    #[must_use]
    pub fn try_context(&self) -> Option<PipeResult<Arc<T>>> {
        self.result.borrow().clone()
    }

    /// Waits for the agent to resolve and returns its outcome.
    pub async fn context(&self) -> PipeResult<Arc<T>> {
        let mut rx = self.result.subscribe();
        let outcome: Slot<T> = rx.wait_for(Option::is_some).await.ok().and_then(|slot| slot.clone());

        outcome.unwrap_or_else(|| {
            Err(PipeError::Internal(format!("Agent {} dropped before resolving", self.name)))
        })
    }

    /// Signals that the consumer is finished with the context.
    pub fn set_completed(&self) -> bool {
        self.completed.send_if_modified(|done| {
            if *done {
                return false;
            }
            *done = true;
            true
        })
    }

    /// Waits for the completion signal.
    pub async fn completed(&self) {
        let mut rx = self.completed.subscribe();
        // The sender lives as long as `self`, so the wait cannot fail.
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Registers a hook run when the agent stops.
    pub fn on_stop<F, Fut>(&self, name: impl Into<String>, hook: F)
    where
        F: FnOnce(Arc<CancellationToken>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.register(name, hook);
    }

    /// Returns the reason passed to the first stop request.
    #[must_use]
    pub fn stop_reason(&self) -> Option<String> {
        self.stop_reason.read().clone()
    }

    /// Returns true once stop has been requested.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Stops the agent, releasing the resources it holds.
    ///
    /// Idempotent: later callers wait until the first stop has run every
    /// hook. An unresolved agent is resolved as canceled with `reason`.
    /// Hooks are individually bounded, so this always completes.
    pub async fn stop(&self, reason: &str, token: &Arc<CancellationToken>) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            let mut rx = self.stopped.subscribe();
            // The sender lives as long as `self`, so the wait cannot fail.
            let _ = rx.wait_for(|stopped| *stopped).await;
            return;
        }

        *self.stop_reason.write() = Some(reason.to_string());
        if token.is_cancelled() {
            debug!(agent = %self.name, reason, "Stopping agent under cancellation");
        }

        if !self.is_resolved() {
            self.canceled(reason);
        }

        let timed_out = self.hooks.run_all(token).await;
        self.set_completed();
        self.stopped.send_replace(true);

        self.events.try_emit(
            event_types::AGENT_STOPPED,
            Some(serde_json::json!({
                "agent_id": self.id.to_string(),
                "agent": self.name,
                "reason": reason,
                "timed_out_hooks": timed_out,
            })),
        );
    }

    fn event_data(&self, error: Option<&PipeError>) -> serde_json::Value {
        serde_json::json!({
            "agent_id": self.id.to_string(),
            "agent": self.name,
            "error": error.map(ToString::to_string),
        })
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Agent for ContextAgent<T> {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> AgentStatus {
        match &*self.result.borrow() {
            None => AgentStatus::Pending,
            Some(Ok(_)) => AgentStatus::Created,
            Some(Err(e)) if e.is_cancelled() => AgentStatus::Canceled,
            Some(Err(_)) => AgentStatus::Faulted,
        }
    }

    fn is_completed(&self) -> bool {
        *self.completed.borrow()
    }

    async fn completed(&self) {
        Self::completed(self).await;
    }

    async fn stop(&self, reason: &str, token: &Arc<CancellationToken>) {
        Self::stop(self, reason, token).await;
    }
}

impl<T> std::fmt::Debug for ContextAgent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextAgent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("resolved", &self.result.borrow().is_some())
            .field("completed", &*self.completed.borrow())
            .field("stopping", &self.stopping.load(Ordering::SeqCst))
            .finish()
    }
}
