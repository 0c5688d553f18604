//! Handles to existing contexts and agents attached to them.

use super::{Agent, AgentStatus, ContextAgent};
use crate::cancellation::CancellationToken;
use crate::errors::PipeResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// A clonable reference to a context owned by another agent.
pub struct ContextHandle<T> {
    agent: Arc<ContextAgent<T>>,
}

impl<T: Send + Sync + 'static> ContextHandle<T> {
    /// Creates a handle to the agent's context.
    #[must_use]
    pub const fn new(agent: Arc<ContextAgent<T>>) -> Self {
        Self { agent }
    }

    /// Waits for the underlying context.
    pub async fn context(&self) -> PipeResult<Arc<T>> {
        self.agent.context().await
    }

    /// Returns true once the owning agent has completed, i.e. the context
    /// may already be released.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.agent.is_completed()
    }

    /// Returns the owning agent.
    #[must_use]
    pub const fn agent(&self) -> &Arc<ContextAgent<T>> {
        &self.agent
    }
}

impl<T> Clone for ContextHandle<T> {
    fn clone(&self) -> Self {
        Self {
            agent: self.agent.clone(),
        }
    }
}

impl<T> std::fmt::Debug for ContextHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("agent", &self.agent)
            .finish()
    }
}

/// An agent sharing an already running context.
///
/// Its own context is derived from the source handle by a background task.
/// Stopping it releases only the derived context; the source keeps running.
pub struct ActiveContextAgent<T> {
    agent: Arc<ContextAgent<T>>,
    source: ContextHandle<T>,
    derivation: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + Sync + 'static> ActiveContextAgent<T> {
    /// Spawns the derivation of `context` and returns the agent it resolves.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F>(agent: ContextAgent<T>, source: ContextHandle<T>, context: F) -> Self
    where
        F: Future<Output = PipeResult<Arc<T>>> + Send + 'static,
    {
        let agent = Arc::new(agent);
        let resolver = agent.clone();
        let derivation = tokio::spawn(async move {
            let outcome = context.await;
            if let Err(e) = &outcome {
                debug!(agent = %resolver.name(), error = %e, "Shared context derivation failed");
            }
            resolver.resolve(outcome);
        });

        Self {
            agent,
            source,
            derivation: Mutex::new(Some(derivation)),
        }
    }

    /// Waits for the derived context.
    pub async fn context(&self) -> PipeResult<Arc<T>> {
        self.agent.context().await
    }

    /// Returns the agent owning the derived context.
    #[must_use]
    pub const fn agent(&self) -> &Arc<ContextAgent<T>> {
        &self.agent
    }

    /// Returns the handle of the context this agent attached to.
    #[must_use]
    pub const fn source(&self) -> &ContextHandle<T> {
        &self.source
    }

    /// Signals that the consumer is finished with the derived context.
    pub fn set_completed(&self) -> bool {
        self.agent.set_completed()
    }

    /// Stops the derived context, aborting a derivation still in flight.
    pub async fn stop(&self, reason: &str, token: &Arc<CancellationToken>) {
        if let Some(derivation) = self.derivation.lock().take() {
            derivation.abort();
        }
        self.agent.stop(reason, token).await;
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Agent for ActiveContextAgent<T> {
    fn id(&self) -> Uuid {
        self.agent.id()
    }

    fn name(&self) -> &str {
        self.agent.name()
    }

    fn status(&self) -> AgentStatus {
        self.agent.status()
    }

    fn is_completed(&self) -> bool {
        self.agent.is_completed()
    }

    async fn completed(&self) {
        self.agent.completed().await;
    }

    async fn stop(&self, reason: &str, token: &Arc<CancellationToken>) {
        Self::stop(self, reason, token).await;
    }
}

impl<T> std::fmt::Debug for ActiveContextAgent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveContextAgent")
            .field("agent", &self.agent)
            .field("source", &self.source)
            .finish()
    }
}
