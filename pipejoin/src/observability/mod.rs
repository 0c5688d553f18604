//! Tracing subscriber setup.
//!
//! The library itself only emits `tracing` events and spans; binaries and
//! test harnesses call one of these once at startup. `RUST_LOG` takes
//! precedence over the default directive.

use crate::errors::{PipeError, PipeResult};
use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "pipejoin=info";

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Installs a human-readable global subscriber.
///
/// Fails with [`PipeError::Config`] if a global subscriber is already set.
pub fn init_tracing(default_directive: &str) -> PipeResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .with_target(true)
        .try_init()
        .map_err(|e| PipeError::Config(format!("Failed to install tracing subscriber: {e}")))
}

/// Installs a global subscriber writing one JSON object per event, with the
/// current span list attached.
pub fn init_json_tracing(default_directive: &str) -> PipeResult<()> {
    tracing_subscriber::fmt()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_env_filter(env_filter(default_directive))
        .try_init()
        .map_err(|e| PipeError::Config(format!("Failed to install tracing subscriber: {e}")))
}
