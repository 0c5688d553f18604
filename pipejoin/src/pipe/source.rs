//! A context source backed by an async factory.

use super::{Pipe, PipeContextSource};
use crate::cancellation::CancellationToken;
use crate::errors::{PipeError, PipeResult};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

type ContextFactory<C> =
    Box<dyn Fn(Arc<CancellationToken>) -> BoxFuture<'static, PipeResult<Arc<C>>> + Send + Sync>;

/// Produces a fresh context per send by calling an async factory, then
/// sends it through the pipe.
///
/// Creation races the cancellation token; a cancelled token fails the send
/// with [`PipeError::Cancelled`] before the pipe runs.
pub struct FactorySource<C> {
    name: String,
    factory: ContextFactory<C>,
}

impl<C: Send + Sync + 'static> FactorySource<C> {
    /// Creates a source named `name` using `factory` to build contexts.
    pub fn new<F, Fut>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(Arc<CancellationToken>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PipeResult<Arc<C>>> + Send + 'static,
    {
        Self {
            name: name.into(),
            factory: Box::new(move |token| Box::pin(factory(token))),
        }
    }

    /// Returns the source name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> PipeContextSource<C> for FactorySource<C> {
    async fn send(&self, pipe: Arc<dyn Pipe<C>>, token: Arc<CancellationToken>) -> PipeResult<()> {
        let context = tokio::select! {
            biased;
            () = token.cancelled() => {
                return Err(PipeError::cancelled(token.reason().unwrap_or_default()));
            }
            created = (self.factory)(token.clone()) => created?,
        };

        debug!(source = %self.name, "Context created");
        pipe.send(context).await
    }
}

impl<C> std::fmt::Debug for FactorySource<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactorySource")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
