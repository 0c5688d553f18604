//! Test assertions for agent results and recorded events.

use std::fmt::Debug;

use crate::errors::{PipeError, PipeResult};
use crate::events::CollectingEventSink;

/// Asserts that the result is a cancellation.
pub fn assert_canceled<T: Debug>(result: &PipeResult<T>) {
    assert!(
        matches!(result, Err(PipeError::Cancelled(_))),
        "Expected cancellation, got: {result:?}"
    );
}

/// Asserts that the result failed with exactly `expected`.
pub fn assert_faulted_with<T: Debug>(result: &PipeResult<T>, expected: &PipeError) {
    match result {
        Err(actual) => assert_eq!(actual, expected, "Unexpected error"),
        Ok(value) => panic!("Expected error {expected:?}, got Ok({value:?})"),
    }
}

/// Returns the number of recorded events of exactly `event_type`.
#[must_use]
pub fn count_events(sink: &CollectingEventSink, event_type: &str) -> usize {
    sink.events()
        .iter()
        .filter(|event| event.event_type == event_type)
        .count()
}

/// Returns the number of recorded events of `event_type` for the agent named `agent`.
#[must_use]
pub fn count_agent_events(sink: &CollectingEventSink, event_type: &str, agent: &str) -> usize {
    sink.events()
        .iter()
        .filter(|event| event.event_type == event_type && event.field("agent") == Some(agent))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventSink;

    #[test]
    fn test_assert_canceled() {
        assert_canceled::<()>(&Err(PipeError::cancelled("stop")));
    }

    #[test]
    #[should_panic(expected = "Expected cancellation")]
    fn test_assert_canceled_rejects_fault() {
        assert_canceled::<()>(&Err(PipeError::faulted("boom")));
    }

    #[test]
    fn test_count_agent_events() {
        let sink = CollectingEventSink::new();
        sink.try_emit("agent.stopped", Some(serde_json::json!({"agent": "join:left"})));
        sink.try_emit("agent.stopped", Some(serde_json::json!({"agent": "join:right"})));
        sink.try_emit("agent.created", Some(serde_json::json!({"agent": "join:left"})));

        assert_eq!(count_events(&sink, "agent.stopped"), 2);
        assert_eq!(count_agent_events(&sink, "agent.stopped", "join:left"), 1);
    }
}
