//! Event sink system for observability.
//!
//! Agents and the join orchestrator report lifecycle transitions through an
//! [`EventSink`]. Emission never fails and never blocks the caller.

mod sink;

pub use sink::{
    CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent,
};

use std::sync::Arc;

/// Event type constants.
pub mod event_types {
    /// An agent's context was created.
    pub const AGENT_CREATED: &str = "agent.created";
    /// An agent's context was canceled.
    pub const AGENT_CANCELED: &str = "agent.canceled";
    /// An agent's context faulted.
    pub const AGENT_FAULTED: &str = "agent.faulted";
    /// An agent was stopped.
    pub const AGENT_STOPPED: &str = "agent.stopped";
    /// A join started both productions.
    pub const JOIN_STARTED: &str = "join.started";
    /// A join published its combined context.
    pub const JOIN_RESOLVED: &str = "join.resolved";
    /// A join faulted before publishing a context.
    pub const JOIN_FAULTED: &str = "join.faulted";
    /// A join was canceled before publishing a context.
    pub const JOIN_CANCELED: &str = "join.canceled";
    /// Both ephemeral agents of a join were stopped.
    pub const JOIN_CLEANUP_COMPLETED: &str = "join.cleanup_completed";
    /// Both productions of a join finished.
    pub const JOIN_DRAINED: &str = "join.drained";
}

/// Returns the sink used when none is configured.
#[must_use]
pub fn default_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpEventSink)
}
