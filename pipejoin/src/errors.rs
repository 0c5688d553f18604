//! Error types for pipe context production and joining.
//!
//! A resolved agent result is observed by every waiter, so errors are
//! cheap to clone and compare.

use std::fmt;
use thiserror::Error;

/// The side of a join a production belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinSide {
    /// The left production (for example, the connection handshake).
    Left,
    /// The right production (for example, the session/link negotiation).
    Right,
}

impl JoinSide {
    /// Returns the lowercase label used in logs and agent names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for JoinSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for pipe context operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipeError {
    /// The operation was cancelled.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// A pipe, source or builder faulted.
    #[error("Pipe faulted: {0}")]
    Faulted(String),

    /// A source could not establish its underlying resource.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// A production finished without supplying a context.
    #[error("The {0} production completed without supplying a context")]
    NoContext(JoinSide),

    /// The consumer completed before the context resolved.
    #[error("Agent stopped: {0}")]
    Stopped(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipeError {
    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled(reason.into())
    }

    /// Creates a fault from any displayable error.
    #[must_use]
    pub fn faulted(error: impl fmt::Display) -> Self {
        Self::Faulted(error.to_string())
    }

    /// Creates a connect failure.
    #[must_use]
    pub fn connect_failed(message: impl Into<String>) -> Self {
        Self::ConnectFailed(message.into())
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

impl From<anyhow::Error> for PipeError {
    fn from(err: anyhow::Error) -> Self {
        Self::Faulted(format!("{err:#}"))
    }
}

impl From<tokio::task::JoinError> for PipeError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled("Task aborted".to_string())
        } else {
            Self::Internal(format!("Task join error: {err}"))
        }
    }
}

/// Convenience alias for results carrying a [`PipeError`].
pub type PipeResult<T> = Result<T, PipeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_side_display() {
        assert_eq!(JoinSide::Left.to_string(), "left");
        assert_eq!(JoinSide::Right.to_string(), "right");
    }

    #[test]
    fn test_no_context_names_side() {
        let err = PipeError::NoContext(JoinSide::Right);
        assert!(err.to_string().contains("right production"));
    }

    #[test]
    fn test_is_cancelled() {
        assert!(PipeError::cancelled("shutdown").is_cancelled());
        assert!(!PipeError::faulted("boom").is_cancelled());
    }

    #[test]
    fn test_from_anyhow_keeps_context_chain() {
        let err = anyhow::anyhow!("socket closed").context("handshake failed");
        let pipe_err = PipeError::from(err);

        assert_eq!(
            pipe_err,
            PipeError::Faulted("handshake failed: socket closed".to_string())
        );
    }
}
