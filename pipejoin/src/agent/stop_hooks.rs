//! Resource-release hooks run when an agent stops.

use crate::cancellation::CancellationToken;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// Default bound on each stop hook.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);

type StopHook = Box<dyn FnOnce(Arc<CancellationToken>) -> BoxFuture<'static, ()> + Send>;

/// Hooks executed in LIFO order when an agent stops.
///
/// Each hook receives the stop call's cancellation token and is bounded by
/// a timeout, so stopping always completes.
pub struct StopHooks {
    hooks: Mutex<Vec<(String, StopHook)>>,
    hook_timeout: Duration,
}

impl StopHooks {
    /// Creates an empty hook list with the default per-hook timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_HOOK_TIMEOUT)
    }

    /// Creates an empty hook list with a custom per-hook timeout.
    #[must_use]
    pub fn with_timeout(hook_timeout: Duration) -> Self {
        Self {
            hooks: Mutex::new(Vec::new()),
            hook_timeout,
        }
    }

    /// Registers a hook.
    pub fn register<F, Fut>(&self, name: impl Into<String>, hook: F)
    where
        F: FnOnce(Arc<CancellationToken>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: StopHook = Box::new(move |token| Box::pin(hook(token)));
        self.hooks.lock().push((name.into(), boxed));
    }

    /// Returns the number of pending hooks.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.hooks.lock().len()
    }

    /// Runs and drains every hook in LIFO order.
    ///
    /// Returns the names of hooks that timed out.
    pub async fn run_all(&self, token: &Arc<CancellationToken>) -> Vec<String> {
        let hooks: Vec<_> = std::mem::take(&mut *self.hooks.lock());
        let mut timed_out = Vec::new();

        for (name, hook) in hooks.into_iter().rev() {
            if timeout(self.hook_timeout, hook(token.clone())).await.is_err() {
                warn!(hook = %name, "Stop hook timed out after {:?}", self.hook_timeout);
                timed_out.push(name);
            }
        }

        timed_out
    }
}

impl Default for StopHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StopHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopHooks")
            .field("pending_count", &self.pending_count())
            .field("hook_timeout", &self.hook_timeout)
            .finish()
    }
}
