//! Joining two independently produced contexts into one.
//!
//! A [`JoinContextFactory`] starts a left and a right production
//! concurrently, waits for both contexts, builds the combined context with a
//! [`JoinContextBuilder`] and publishes it through a supervisor agent. The
//! left and right agents are only stopped once the combined context's
//! consumer signals completion, or as soon as the join faults or is
//! cancelled.

mod factory;
#[cfg(test)]
mod join_tests;
mod options;

pub use factory::JoinContextFactory;
pub use options::{JoinOptions, DEFAULT_STOP_REASON};

use crate::agent::{ActiveContextAgent, ContextAgent, ContextHandle};
use crate::cancellation::CancellationToken;
use crate::context::PipeContext;
use crate::errors::{PipeError, PipeResult};
use crate::supervisor::Supervisor;
use async_trait::async_trait;
use std::sync::Arc;

/// Creates supervised agents for contexts of type `C`.
pub trait PipeContextFactory<C: Send + Sync + 'static>: Send + Sync {
    /// Creates a new context, returning the agent it will be published to.
    fn create_context(&self, supervisor: &Supervisor) -> Arc<ContextAgent<C>>;

    /// Attaches a new consumer to an already running context.
    fn create_active_context(
        &self,
        supervisor: &Supervisor,
        context: ContextHandle<C>,
        token: Arc<CancellationToken>,
    ) -> Arc<ActiveContextAgent<C>>;
}

/// Transport-specific construction of a combined context.
#[async_trait]
pub trait JoinContextBuilder<L, R, C>: Send + Sync
where
    L: PipeContext,
    R: PipeContext,
    C: PipeContext,
{
    /// Builds the combined context from both sides.
    fn create_combined(&self, left: &Arc<L>, right: &Arc<R>) -> PipeResult<C>;

    /// Derives a context for a new consumer of an existing combined context.
    ///
    /// The default shares the existing context as-is.
    async fn create_shared_context(
        &self,
        existing: ContextHandle<C>,
        token: Arc<CancellationToken>,
    ) -> PipeResult<Arc<C>> {
        tokio::select! {
            biased;
            () = token.cancelled() => Err(PipeError::cancelled(token.reason().unwrap_or_default())),
            shared = existing.context() => shared,
        }
    }
}

type CombineFn<L, R, C> = Box<dyn Fn(&Arc<L>, &Arc<R>) -> PipeResult<C> + Send + Sync>;

/// A [`JoinContextBuilder`] backed by a closure, sharing existing contexts
/// unchanged.
pub struct FnJoinBuilder<L, R, C> {
    combine: CombineFn<L, R, C>,
}

impl<L, R, C> FnJoinBuilder<L, R, C>
where
    L: PipeContext,
    R: PipeContext,
    C: PipeContext,
{
    /// Creates a builder using `combine` to build combined contexts.
    pub fn new<F>(combine: F) -> Self
    where
        F: Fn(&Arc<L>, &Arc<R>) -> PipeResult<C> + Send + Sync + 'static,
    {
        Self {
            combine: Box::new(combine),
        }
    }
}

#[async_trait]
impl<L, R, C> JoinContextBuilder<L, R, C> for FnJoinBuilder<L, R, C>
where
    L: PipeContext,
    R: PipeContext,
    C: PipeContext,
{
    fn create_combined(&self, left: &Arc<L>, right: &Arc<R>) -> PipeResult<C> {
        (self.combine)(left, right)
    }
}

impl<L, R, C> std::fmt::Debug for FnJoinBuilder<L, R, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnJoinBuilder").finish_non_exhaustive()
    }
}
