//! Testing utilities for joins.
//!
//! This module provides:
//! - Mock context sources (delayed, failing, never-resolving)
//! - Left, right and combined test contexts with a matching join builder
//! - Assertions over agent results and recorded events

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_canceled, assert_faulted_with, count_agent_events, count_events};
pub use fixtures::{
    mock_join, test_join, CombinedContext, LeftContext, RightContext, TestJoin, TestJoinBuilder,
};
pub use mocks::{FailingContextSource, MockContextSource, PendingContextSource};
