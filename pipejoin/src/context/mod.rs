//! Pipe contexts and their payloads.
//!
//! A context is an opaque value flowing through a pipe. It carries a
//! type-keyed set of lazily created payloads, at most one per type, which
//! is how a joined context exposes the two contexts it was built from.

mod payload;

pub use payload::PayloadCache;

use crate::cancellation::CancellationToken;
use std::any::Any;
use std::sync::Arc;

/// A payload-bearing context flowing through a pipe.
///
/// Implementors only provide storage; every payload operation is provided.
pub trait PipeContext: Send + Sync + 'static {
    /// Returns the payload storage for this context.
    fn payloads(&self) -> &PayloadCache;

    /// Returns the cancellation token observed by work on this context.
    fn cancellation_token(&self) -> &Arc<CancellationToken>;

    /// Returns true if a payload of type `P` is attached.
    fn has_payload<P: Any + Send + Sync>(&self) -> bool
    where
        Self: Sized,
    {
        self.payloads().contains::<P>()
    }

    /// Returns the payload of type `P`, if attached.
    fn try_get_payload<P: Any + Send + Sync>(&self) -> Option<Arc<P>>
    where
        Self: Sized,
    {
        self.payloads().get::<P>()
    }

    /// Returns the payload of type `P`, creating it if missing.
    fn get_or_add_payload<P, F>(&self, factory: F) -> Arc<P>
    where
        Self: Sized,
        P: Any + Send + Sync,
        F: FnOnce() -> P,
    {
        self.payloads().get_or_add(factory)
    }

    /// Returns the payload of type `P`, attaching an existing `Arc` if missing.
    fn get_or_add_shared_payload<P, F>(&self, factory: F) -> Arc<P>
    where
        Self: Sized,
        P: Any + Send + Sync,
        F: FnOnce() -> Arc<P>,
    {
        self.payloads().get_or_add_shared(factory)
    }

    /// Adds the payload of type `P` or replaces it with an updated value.
    fn add_or_update_payload<P, A, U>(&self, add: A, update: U) -> Arc<P>
    where
        Self: Sized,
        P: Any + Send + Sync,
        A: Fn() -> P,
        U: Fn(&P) -> P,
    {
        self.payloads().add_or_update(add, update)
    }
}

/// Reusable storage for [`PipeContext`] implementors.
///
/// Concrete contexts embed a `BasePipeContext` and delegate to it.
#[derive(Debug)]
pub struct BasePipeContext {
    payloads: PayloadCache,
    cancellation_token: Arc<CancellationToken>,
}

impl BasePipeContext {
    /// Creates a context observing the given cancellation token.
    #[must_use]
    pub fn new(cancellation_token: Arc<CancellationToken>) -> Self {
        Self {
            payloads: PayloadCache::new(),
            cancellation_token,
        }
    }
}

impl Default for BasePipeContext {
    fn default() -> Self {
        Self::new(CancellationToken::shared())
    }
}

impl PipeContext for BasePipeContext {
    fn payloads(&self) -> &PayloadCache {
        &self.payloads
    }

    fn cancellation_token(&self) -> &Arc<CancellationToken> {
        &self.cancellation_token
    }
}
