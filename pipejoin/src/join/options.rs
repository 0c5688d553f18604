//! Join configuration.

use crate::errors::{PipeError, PipeResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default reason passed to the ephemeral agents when a join cleans up.
pub const DEFAULT_STOP_REASON: &str = "Complete";

/// Configuration for a [`JoinContextFactory`](super::JoinContextFactory).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinOptions {
    /// Label used for agent names and log fields.
    pub name: String,
    /// Reason passed when stopping the left and right agents.
    pub stop_reason: String,
    /// Upper bound on waiting for both productions after cleanup.
    /// `None` waits for as long as they take.
    pub drain_timeout_secs: Option<f64>,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            name: "join".to_string(),
            stop_reason: DEFAULT_STOP_REASON.to_string(),
            drain_timeout_secs: None,
        }
    }
}

impl JoinOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> PipeResult<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| PipeError::Config(format!("Invalid join options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Sets the join name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the stop reason.
    #[must_use]
    pub fn with_stop_reason(mut self, reason: impl Into<String>) -> Self {
        self.stop_reason = reason.into();
        self
    }

    /// Bounds the final drain of both productions.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    /// Returns the drain timeout, if any.
    #[must_use]
    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_secs
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }

    /// Validates the options.
    pub fn validate(&self) -> PipeResult<()> {
        if self.name.trim().is_empty() {
            return Err(PipeError::Config("name must not be empty".to_string()));
        }
        if self.stop_reason.trim().is_empty() {
            return Err(PipeError::Config("stop_reason must not be empty".to_string()));
        }
        if let Some(secs) = self.drain_timeout_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(PipeError::Config(format!(
                    "drain_timeout_secs must be a positive number, got {secs}"
                )));
            }
        }
        Ok(())
    }
}
