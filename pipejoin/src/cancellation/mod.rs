//! Cooperative cancellation.
//!
//! A single [`CancellationToken`] is threaded through both productions of a
//! join and through the stop calls that release them.

mod token;

pub use token::{CancelCallback, CancellationToken};
