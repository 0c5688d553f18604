//! # Pipejoin
//!
//! Joins two independently produced pipe contexts into one combined context.
//!
//! A transport often needs two resources at once, such as a connection and
//! a session negotiated on it. Pipejoin produces both concurrently, publishes
//! a combined context that carries each as a payload, and keeps both alive
//! until the combined context's consumer signals completion:
//!
//! - **Agents**: single-resolution handles exposing a context, a completion
//!   signal and a stop operation
//! - **Joins**: fail-fast concurrent production with guaranteed cleanup of
//!   both sides
//! - **Supervision**: a registry of live agents and a shared shutdown token
//! - **Payloads**: a type-keyed, lazily populated cache on every context
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pipejoin::prelude::*;
//!
//! let join = JoinContextFactory::new(
//!     connection_source, empty_pipe(),
//!     session_source, empty_pipe(),
//!     Arc::new(FnJoinBuilder::new(|conn, session| Ok(Link::new(conn, session)))),
//! );
//!
//! let supervisor = Supervisor::new("bus");
//! let link = join.create_context(&supervisor).context().await?;
//! let conn = link.try_get_payload::<Connection>();
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod agent;
pub mod cancellation;
pub mod context;
pub mod errors;
pub mod events;
pub mod join;
pub mod observability;
pub mod pipe;
pub mod supervisor;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agent::{
        ActiveContextAgent, Agent, AgentStatus, ContextAgent, ContextHandle,
    };
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::{BasePipeContext, PayloadCache, PipeContext};
    pub use crate::errors::{JoinSide, PipeError, PipeResult};
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::join::{
        FnJoinBuilder, JoinContextBuilder, JoinContextFactory, JoinOptions,
        PipeContextFactory,
    };
    pub use crate::pipe::{
        empty_pipe, AgentPipe, FactorySource, FnPipe, Pipe, PipeContextSource,
    };
    pub use crate::supervisor::Supervisor;
}
