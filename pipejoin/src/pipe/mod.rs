//! Pipes and the sources that drive contexts through them.
//!
//! A [`PipeContextSource`] produces a context and sends it through a
//! [`Pipe`]; the returned future completes when processing finishes or
//! fails. [`AgentPipe`] is the wrapping stage that publishes the context to
//! a [`ContextAgent`](crate::agent::ContextAgent) and keeps it alive until
//! the agent completes.

mod agent_pipe;
mod source;

pub use agent_pipe::AgentPipe;
pub use source::FactorySource;

use crate::cancellation::CancellationToken;
use crate::errors::PipeResult;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// A unit of work run over a context.
#[async_trait]
pub trait Pipe<C: Send + Sync + 'static>: Send + Sync {
    /// Runs the pipe over the context.
    async fn send(&self, context: Arc<C>) -> PipeResult<()>;
}

/// A producer of contexts.
#[async_trait]
pub trait PipeContextSource<C: Send + Sync + 'static>: Send + Sync {
    /// Produces a context and sends it through `pipe`, observing `token`.
    async fn send(&self, pipe: Arc<dyn Pipe<C>>, token: Arc<CancellationToken>) -> PipeResult<()>;
}

type PipeFn<C> = Box<dyn Fn(Arc<C>) -> BoxFuture<'static, PipeResult<()>> + Send + Sync>;

/// A pipe built from an async closure.
pub struct FnPipe<C> {
    func: PipeFn<C>,
}

impl<C: Send + Sync + 'static> FnPipe<C> {
    /// Creates a pipe running `func` for every context.
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PipeResult<()>> + Send + 'static,
    {
        Self {
            func: Box::new(move |context| Box::pin(func(context))),
        }
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> Pipe<C> for FnPipe<C> {
    async fn send(&self, context: Arc<C>) -> PipeResult<()> {
        (self.func)(context).await
    }
}

impl<C> std::fmt::Debug for FnPipe<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPipe").finish_non_exhaustive()
    }
}

/// A pipe that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyPipe;

#[async_trait]
impl<C: Send + Sync + 'static> Pipe<C> for EmptyPipe {
    async fn send(&self, _context: Arc<C>) -> PipeResult<()> {
        Ok(())
    }
}

/// Returns a shared [`EmptyPipe`].
#[must_use]
pub fn empty_pipe<C: Send + Sync + 'static>() -> Arc<dyn Pipe<C>> {
    Arc::new(EmptyPipe)
}
