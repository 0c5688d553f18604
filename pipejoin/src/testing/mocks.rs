//! Mock context sources for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::errors::{PipeError, PipeResult};
use crate::pipe::{Pipe, PipeContextSource};

/// Waits for `delay`, failing with [`PipeError::Cancelled`] if the token
/// fires first.
async fn delay_or_cancel(delay: Duration, token: &CancellationToken) -> PipeResult<()> {
    tokio::select! {
        biased;
        () = token.cancelled() => Err(PipeError::cancelled(token.reason().unwrap_or_default())),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

/// A source that sends a fixed context after a delay.
///
/// The same `Arc` is sent on every call, so tests can compare identities.
#[derive(Debug)]
pub struct MockContextSource<C> {
    context: Arc<C>,
    delay: Duration,
    fault_after_send: Mutex<Option<PipeError>>,
    send_count: AtomicUsize,
    finished_count: AtomicUsize,
}

impl<C: Send + Sync + 'static> MockContextSource<C> {
    /// Creates a source sending `context` immediately.
    #[must_use]
    pub fn new(context: Arc<C>) -> Self {
        Self {
            context,
            delay: Duration::ZERO,
            fault_after_send: Mutex::new(None),
            send_count: AtomicUsize::new(0),
            finished_count: AtomicUsize::new(0),
        }
    }

    /// Delays the context by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fails the production with `error` once the pipe has returned.
    #[must_use]
    pub fn fault_after_send(self, error: PipeError) -> Self {
        *self.fault_after_send.lock() = Some(error);
        self
    }

    /// Returns the context this source sends.
    #[must_use]
    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    /// Returns how many times `send` was called.
    #[must_use]
    pub fn send_count(&self) -> usize {
        self.send_count.load(Ordering::SeqCst)
    }

    /// Returns how many sends ran to completion.
    #[must_use]
    pub fn finished_count(&self) -> usize {
        self.finished_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> PipeContextSource<C> for MockContextSource<C> {
    async fn send(&self, pipe: Arc<dyn Pipe<C>>, token: Arc<CancellationToken>) -> PipeResult<()> {
        self.send_count.fetch_add(1, Ordering::SeqCst);
        delay_or_cancel(self.delay, &token).await?;

        pipe.send(self.context.clone()).await?;
        self.finished_count.fetch_add(1, Ordering::SeqCst);

        match self.fault_after_send.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// A source that fails after a delay without ever sending a context.
#[derive(Debug, Clone)]
pub struct FailingContextSource {
    error: PipeError,
    delay: Duration,
}

impl FailingContextSource {
    /// Creates a source failing immediately with `error`.
    #[must_use]
    pub fn new(error: PipeError) -> Self {
        Self {
            error,
            delay: Duration::ZERO,
        }
    }

    /// Delays the failure by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> PipeContextSource<C> for FailingContextSource {
    async fn send(&self, _pipe: Arc<dyn Pipe<C>>, token: Arc<CancellationToken>) -> PipeResult<()> {
        delay_or_cancel(self.delay, &token).await?;
        Err(self.error.clone())
    }
}

/// A source that never produces; it only returns once cancelled.
#[derive(Debug, Default)]
pub struct PendingContextSource {
    cancelled_count: AtomicUsize,
}

impl PendingContextSource {
    /// Creates a pending source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many sends observed cancellation.
    #[must_use]
    pub fn cancelled_count(&self) -> usize {
        self.cancelled_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> PipeContextSource<C> for PendingContextSource {
    async fn send(&self, _pipe: Arc<dyn Pipe<C>>, token: Arc<CancellationToken>) -> PipeResult<()> {
        token.cancelled().await;
        self.cancelled_count.fetch_add(1, Ordering::SeqCst);
        Err(PipeError::cancelled(token.reason().unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::empty_pipe;

    #[tokio::test]
    async fn test_mock_source_counts_sends() {
        let source = MockContextSource::new(Arc::new(3_u32));

        source.send(empty_pipe(), CancellationToken::shared()).await.unwrap();

        assert_eq!(source.send_count(), 1);
        assert_eq!(source.finished_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_source_faults_after_send() {
        let source = MockContextSource::new(Arc::new(3_u32)).fault_after_send(PipeError::faulted("late"));

        let err = source.send(empty_pipe(), CancellationToken::shared()).await.unwrap_err();

        assert_eq!(err, PipeError::faulted("late"));
        assert_eq!(source.finished_count(), 1);
    }

    #[tokio::test]
    async fn test_pending_source_returns_on_cancel() {
        let source = Arc::new(PendingContextSource::new());
        let token = CancellationToken::shared();
        token.cancel("done");

        let err = PipeContextSource::<u32>::send(source.as_ref(), empty_pipe(), token)
            .await
            .unwrap_err();

        assert_eq!(err, PipeError::cancelled("done"));
        assert_eq!(source.cancelled_count(), 1);
    }
}
