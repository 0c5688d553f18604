//! Test contexts and join fixtures.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::mocks::MockContextSource;
use crate::agent::ContextHandle;
use crate::cancellation::CancellationToken;
use crate::context::{BasePipeContext, PayloadCache, PipeContext};
use crate::errors::{PipeError, PipeResult};
use crate::join::{JoinContextBuilder, JoinContextFactory};
use crate::pipe::{empty_pipe, PipeContextSource};

/// A labelled left-side context, standing in for a connection.
#[derive(Debug)]
pub struct LeftContext {
    base: BasePipeContext,
    /// Label identifying this context in assertions.
    pub label: String,
}

impl LeftContext {
    /// Creates a left context.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            base: BasePipeContext::default(),
            label: label.into(),
        }
    }

    /// Creates a shared left context.
    #[must_use]
    pub fn shared(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(label))
    }
}

impl PipeContext for LeftContext {
    fn payloads(&self) -> &PayloadCache {
        self.base.payloads()
    }

    fn cancellation_token(&self) -> &Arc<CancellationToken> {
        self.base.cancellation_token()
    }
}

/// A labelled right-side context, standing in for a session.
#[derive(Debug)]
pub struct RightContext {
    base: BasePipeContext,
    /// Label identifying this context in assertions.
    pub label: String,
}

impl RightContext {
    /// Creates a right context.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            base: BasePipeContext::default(),
            label: label.into(),
        }
    }

    /// Creates a shared right context.
    #[must_use]
    pub fn shared(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(label))
    }
}

impl PipeContext for RightContext {
    fn payloads(&self) -> &PayloadCache {
        self.base.payloads()
    }

    fn cancellation_token(&self) -> &Arc<CancellationToken> {
        self.base.cancellation_token()
    }
}

/// The combined context built by [`TestJoinBuilder`].
#[derive(Debug)]
pub struct CombinedContext {
    base: BasePipeContext,
    /// `"<left>+<right>"`.
    pub label: String,
}

impl CombinedContext {
    /// Returns the left context attached as a payload.
    #[must_use]
    pub fn left(&self) -> Option<Arc<LeftContext>> {
        self.try_get_payload::<LeftContext>()
    }

    /// Returns the right context attached as a payload.
    #[must_use]
    pub fn right(&self) -> Option<Arc<RightContext>> {
        self.try_get_payload::<RightContext>()
    }
}

impl PipeContext for CombinedContext {
    fn payloads(&self) -> &PayloadCache {
        self.base.payloads()
    }

    fn cancellation_token(&self) -> &Arc<CancellationToken> {
        self.base.cancellation_token()
    }
}

/// A builder combining labels, with an optional failure and call counters.
#[derive(Debug, Default)]
pub struct TestJoinBuilder {
    failure: Option<PipeError>,
    combined_count: AtomicUsize,
    shared_count: AtomicUsize,
}

impl TestJoinBuilder {
    /// Creates a builder that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder whose combine step fails with `error`.
    #[must_use]
    pub fn failing(error: PipeError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    /// Returns how many combined contexts were requested.
    #[must_use]
    pub fn combined_count(&self) -> usize {
        self.combined_count.load(Ordering::SeqCst)
    }

    /// Returns how many shared contexts were requested.
    #[must_use]
    pub fn shared_count(&self) -> usize {
        self.shared_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JoinContextBuilder<LeftContext, RightContext, CombinedContext> for TestJoinBuilder {
    fn create_combined(&self, left: &Arc<LeftContext>, right: &Arc<RightContext>) -> PipeResult<CombinedContext> {
        self.combined_count.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        Ok(CombinedContext {
            base: BasePipeContext::new(left.cancellation_token().clone()),
            label: format!("{}+{}", left.label, right.label),
        })
    }

    async fn create_shared_context(
        &self,
        existing: ContextHandle<CombinedContext>,
        token: Arc<CancellationToken>,
    ) -> PipeResult<Arc<CombinedContext>> {
        self.shared_count.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let existing = tokio::select! {
            biased;
            () = token.cancelled() => return Err(PipeError::cancelled(token.reason().unwrap_or_default())),
            existing = existing.context() => existing?,
        };

        let shared = CombinedContext {
            base: BasePipeContext::new(token),
            label: format!("{}:shared", existing.label),
        };
        if let Some(left) = existing.left() {
            shared.get_or_add_shared_payload(|| left);
        }
        if let Some(right) = existing.right() {
            shared.get_or_add_shared_payload(|| right);
        }
        Ok(Arc::new(shared))
    }
}

/// The factory type produced by [`test_join`].
pub type TestJoin = JoinContextFactory<LeftContext, RightContext, CombinedContext>;

/// Builds a join over two sources with pass-through pipes.
pub fn test_join(
    left: Arc<dyn PipeContextSource<LeftContext>>,
    right: Arc<dyn PipeContextSource<RightContext>>,
    builder: Arc<TestJoinBuilder>,
) -> TestJoin {
    JoinContextFactory::new(left, empty_pipe(), right, empty_pipe(), builder)
}

/// Builds a join over two mock sources with a succeeding builder.
pub fn mock_join(
    left: &Arc<MockContextSource<LeftContext>>,
    right: &Arc<MockContextSource<RightContext>>,
) -> TestJoin {
    test_join(left.clone(), right.clone(), Arc::new(TestJoinBuilder::new()))
}
