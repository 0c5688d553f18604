//! Context agents.
//!
//! An agent is the synchronization object between a production and the
//! code waiting for its context:
//! - a single-resolution result (created, canceled or faulted)
//! - a completion signal raised by the consumer
//! - an idempotent stop operation releasing the context

mod active;
mod context_agent;
mod stop_hooks;

pub use active::{ActiveContextAgent, ContextHandle};
pub use context_agent::ContextAgent;
pub use stop_hooks::{StopHooks, DEFAULT_HOOK_TIMEOUT};

use crate::cancellation::CancellationToken;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// The resolution state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// No outcome yet.
    Pending,
    /// A context was supplied.
    Created,
    /// The production was canceled.
    Canceled,
    /// The production faulted.
    Faulted,
}

impl AgentStatus {
    /// Returns true for every state except `Pending`.
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Type-erased view of an agent, used by the supervisor registry.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Returns the agent's unique id.
    fn id(&self) -> Uuid;

    /// Returns the agent's name.
    fn name(&self) -> &str;

    /// Returns the agent's resolution state.
    fn status(&self) -> AgentStatus;

    /// Returns true once the agent's result has been resolved.
    fn is_resolved(&self) -> bool {
        self.status().is_resolved()
    }

    /// Returns true once the consumer signalled completion or the agent stopped.
    fn is_completed(&self) -> bool;

    /// Waits until the agent is completed.
    async fn completed(&self);

    /// Requests the agent to release its resources.
    async fn stop(&self, reason: &str, token: &Arc<CancellationToken>);
}
