//! Pipe stage that publishes its context to an agent.

use super::Pipe;
use crate::agent::{Agent, ContextAgent};
use crate::errors::PipeResult;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Wraps a pipe so that the context it processed is published to an agent.
///
/// After the inner pipe succeeds, the agent is resolved with the context and
/// the send stays pending until the agent completes (is stopped or its
/// consumer signals completion). That keeps the source's resources alive for
/// as long as the published context is in use. A failing inner pipe resolves
/// the agent canceled or faulted and the error is returned to the source.
pub struct AgentPipe<C> {
    agent: Arc<ContextAgent<C>>,
    pipe: Arc<dyn Pipe<C>>,
}

impl<C: Send + Sync + 'static> AgentPipe<C> {
    /// Wraps `pipe` so it publishes to `agent`.
    #[must_use]
    pub fn new(agent: Arc<ContextAgent<C>>, pipe: Arc<dyn Pipe<C>>) -> Self {
        Self { agent, pipe }
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> Pipe<C> for AgentPipe<C> {
    async fn send(&self, context: Arc<C>) -> PipeResult<()> {
        if let Err(e) = self.pipe.send(context.clone()).await {
            self.agent.resolve(Err(e.clone()));
            return Err(e);
        }

        if !self.agent.created(context) {
            debug!(agent = %self.agent.name(), "Agent already resolved, releasing context");
            return Ok(());
        }

        self.agent.completed().await;
        Ok(())
    }
}

impl<C> std::fmt::Debug for AgentPipe<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPipe")
            .field("agent", &self.agent)
            .finish_non_exhaustive()
    }
}
