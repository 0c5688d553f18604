//! Supervisor registry for live context agents.
//!
//! The supervisor creates agents, tracks them until they complete, and owns
//! the shutdown token shared by every production it oversees. A completed
//! agent is dropped from the registry on its own.

use crate::agent::{ActiveContextAgent, Agent, ContextAgent, ContextHandle};
use crate::cancellation::CancellationToken;
use crate::errors::PipeResult;
use crate::events::{default_sink, EventSink};
use dashmap::DashMap;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Reason used when an agent is added after shutdown.
pub const SUPERVISOR_STOPPED: &str = "Supervisor stopped";

/// Process-wide registry of context agents.
pub struct Supervisor {
    name: String,
    stopped: Arc<CancellationToken>,
    agents: Arc<DashMap<Uuid, Arc<dyn Agent>>>,
    events: Arc<dyn EventSink>,
}

impl Supervisor {
    /// Creates a running supervisor.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stopped: CancellationToken::shared(),
            agents: Arc::new(DashMap::new()),
            events: default_sink(),
        }
    }

    /// Sets the sink handed to every agent this supervisor creates.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the supervisor name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the shutdown token; it is cancelled by [`stop`](Self::stop).
    #[must_use]
    pub const fn stopped(&self) -> &Arc<CancellationToken> {
        &self.stopped
    }

    /// Returns the event sink shared with created agents.
    #[must_use]
    pub const fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Returns true once shutdown has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    /// Creates and registers an agent whose context will be supplied later.
    ///
    /// After shutdown the agent is returned already canceled.
    pub fn add_async_context<T: Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
    ) -> Arc<ContextAgent<T>> {
        let agent = Arc::new(ContextAgent::new(name).with_event_sink(self.events.clone()));

        if self.is_stopped() {
            agent.canceled(SUPERVISOR_STOPPED);
            return agent;
        }

        self.add_agent(agent.clone());
        agent
    }

    /// Registers an agent sharing the context behind `handle`, resolved by
    /// the `context` future.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn add_active_context<T, F>(&self, handle: ContextHandle<T>, context: F) -> Arc<ActiveContextAgent<T>>
    where
        T: Send + Sync + 'static,
        F: Future<Output = PipeResult<Arc<T>>> + Send + 'static,
    {
        let name = format!("{}:active", handle.agent().name());
        let agent = ContextAgent::new(name).with_event_sink(self.events.clone());
        let active = Arc::new(ActiveContextAgent::spawn(agent, handle, context));

        if self.is_stopped() {
            active.agent().canceled(SUPERVISOR_STOPPED);
            return active;
        }

        self.add_agent(active.clone());
        active
    }

    /// Registers an existing agent until it completes.
    ///
    /// Outside a Tokio runtime the agent stays registered until
    /// [`prune_completed`](Self::prune_completed) or [`stop`](Self::stop).
    pub fn add_agent(&self, agent: Arc<dyn Agent>) {
        debug!(supervisor = %self.name, agent = %agent.name(), "Agent registered");
        let id = agent.id();
        self.agents.insert(id, agent.clone());

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(supervisor = %self.name, "No runtime, completed agents need pruning");
            return;
        };
        let agents = Arc::downgrade(&self.agents);
        let supervisor = self.name.clone();
        runtime.spawn(async move {
            agent.completed().await;
            if let Some(agents) = agents.upgrade() {
                if agents.remove(&id).is_some() {
                    debug!(supervisor = %supervisor, agent = %agent.name(), "Completed agent removed");
                }
            }
        });
    }

    /// Removes an agent from the registry without stopping it.
    pub fn remove(&self, id: Uuid) -> Option<Arc<dyn Agent>> {
        self.agents.remove(&id).map(|(_, agent)| agent)
    }

    /// Returns a registered agent.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Arc<dyn Agent>> {
        self.agents.get(&id).map(|entry| entry.value().clone())
    }

    /// Returns the number of registered agents.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Drops completed agents from the registry, returning how many were removed.
    pub fn prune_completed(&self) -> usize {
        let before = self.agents.len();
        self.agents.retain(|_, agent| !agent.is_completed());
        before.saturating_sub(self.agents.len())
    }

    /// Cancels the shutdown token and stops every registered agent concurrently.
    pub async fn stop(&self, reason: &str) {
        self.stopped.cancel(reason);

        let agents: Vec<Arc<dyn Agent>> = self
            .agents
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.agents.clear();

        info!(supervisor = %self.name, agents = agents.len(), reason, "Stopping supervisor");
        join_all(agents.iter().map(|agent| agent.stop(reason, &self.stopped))).await;
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new("supervisor")
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("name", &self.name)
            .field("agent_count", &self.agent_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
