//! End-to-end join scenarios.

use super::{JoinOptions, PipeContextFactory};
use crate::agent::{Agent, AgentStatus, ContextAgent, ContextHandle};
use crate::cancellation::CancellationToken;
use crate::errors::{JoinSide, PipeError, PipeResult};
use crate::events::{event_types, CollectingEventSink};
use crate::pipe::{Pipe, PipeContextSource};
use crate::supervisor::Supervisor;
use crate::testing::{
    assert_canceled, assert_faulted_with, count_agent_events, count_events, mock_join, test_join,
    CombinedContext, FailingContextSource, LeftContext, MockContextSource, PendingContextSource,
    RightContext, TestJoin, TestJoinBuilder,
};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn outer_agent() -> Arc<ContextAgent<CombinedContext>> {
    Arc::new(ContextAgent::new("outer"))
}

fn with_events(join: TestJoin) -> (TestJoin, Arc<CollectingEventSink>) {
    let events = Arc::new(CollectingEventSink::new());
    (join.with_event_sink(events.clone()), events)
}

fn stops(events: &CollectingEventSink, side: &str) -> usize {
    count_agent_events(events, event_types::AGENT_STOPPED, &format!("join:{side}"))
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let reached = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(ms(2)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "condition not reached within 2s");
}

async fn wait_for_event(events: &CollectingEventSink, event_type: &str) {
    wait_until(|| count_events(events, event_type) > 0).await;
}

/// Sends its context, then keeps running regardless of stop or cancellation.
struct StubbornSource {
    context: Arc<LeftContext>,
}

#[async_trait]
impl PipeContextSource<LeftContext> for StubbornSource {
    async fn send(&self, pipe: Arc<dyn Pipe<LeftContext>>, _token: Arc<CancellationToken>) -> PipeResult<()> {
        pipe.send(self.context.clone()).await?;
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

#[tokio::test]
async fn test_both_sides_resolve_into_combined_context() {
    let left = Arc::new(MockContextSource::new(LeftContext::shared("L1")).with_delay(ms(10)));
    let right = Arc::new(MockContextSource::new(RightContext::shared("R1")).with_delay(ms(20)));
    let (join, events) = with_events(mock_join(&left, &right));
    let outer = outer_agent();

    let started = Instant::now();
    let combined = assert_ok!(join.create_join_context(outer.clone(), CancellationToken::shared()).await);

    assert!(started.elapsed() >= ms(15));
    assert_eq!(combined.label, "L1+R1");
    assert_eq!(outer.status(), AgentStatus::Created);
    assert_eq!(count_events(&events, event_types::JOIN_RESOLVED), 1);

    tokio::time::sleep(ms(10)).await;
    outer.set_completed();
    wait_for_event(&events, event_types::JOIN_DRAINED).await;

    assert_eq!(stops(&events, "left"), 1);
    assert_eq!(stops(&events, "right"), 1);
    assert_eq!(left.finished_count(), 1);
    assert_eq!(right.finished_count(), 1);
}

#[tokio::test]
async fn test_combined_context_carries_both_sides_as_payloads() {
    let left = Arc::new(MockContextSource::new(LeftContext::shared("conn")));
    let right = Arc::new(MockContextSource::new(RightContext::shared("session")));
    let join = mock_join(&left, &right);

    let combined = assert_ok!(join.create_join_context(outer_agent(), CancellationToken::shared()).await);

    let attached_left = combined.left().expect("left payload");
    let attached_right = combined.right().expect("right payload");
    assert!(Arc::ptr_eq(&attached_left, left.context()));
    assert!(Arc::ptr_eq(&attached_right, right.context()));
}

#[tokio::test]
async fn test_cleanup_waits_for_consumer_completion() {
    let left = Arc::new(MockContextSource::new(LeftContext::shared("L")));
    let right = Arc::new(MockContextSource::new(RightContext::shared("R")));
    let (join, events) = with_events(mock_join(&left, &right));
    let outer = outer_agent();

    assert_ok!(join.create_join_context(outer.clone(), CancellationToken::shared()).await);
    tokio::time::sleep(ms(30)).await;

    assert_eq!(count_events(&events, event_types::AGENT_STOPPED), 0);
    assert_eq!(left.finished_count(), 0);
    assert_eq!(right.finished_count(), 0);

    outer.set_completed();
    wait_for_event(&events, event_types::JOIN_DRAINED).await;

    assert_eq!(stops(&events, "left"), 1);
    assert_eq!(stops(&events, "right"), 1);
}

#[tokio::test]
async fn test_right_failure_faults_join_without_waiting_for_left() {
    let left = Arc::new(MockContextSource::new(LeftContext::shared("L")).with_delay(ms(300)));
    let right = Arc::new(FailingContextSource::new(PipeError::connect_failed("refused")).with_delay(ms(5)));
    let (join, events) = with_events(test_join(left.clone(), right, Arc::new(TestJoinBuilder::new())));
    let outer = outer_agent();

    let started = Instant::now();
    let result = join.create_join_context(outer.clone(), CancellationToken::shared()).await;

    assert!(started.elapsed() < ms(250));
    assert_faulted_with(&result, &PipeError::connect_failed("refused"));
    assert_eq!(outer.status(), AgentStatus::Faulted);

    wait_for_event(&events, event_types::JOIN_CLEANUP_COMPLETED).await;
    assert_eq!(stops(&events, "left"), 1);
    assert_eq!(stops(&events, "right"), 1);
    assert_eq!(count_events(&events, event_types::JOIN_FAULTED), 1);

    wait_for_event(&events, event_types::JOIN_DRAINED).await;
    assert_eq!(left.send_count(), 1);
}

#[tokio::test]
async fn test_cancellation_before_resolution_cancels_join() {
    let left = Arc::new(PendingContextSource::new());
    let right = Arc::new(PendingContextSource::new());
    let (join, events) = with_events(test_join(left.clone(), right.clone(), Arc::new(TestJoinBuilder::new())));
    let token = CancellationToken::shared();

    let cancel = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ms(1)).await;
            token.cancel("shutdown");
        })
    };
    let result = join.create_join_context(outer_agent(), token).await;
    cancel.await.unwrap();

    assert_canceled(&result);
    wait_for_event(&events, event_types::JOIN_DRAINED).await;

    assert_eq!(count_events(&events, event_types::JOIN_CANCELED), 1);
    assert_eq!(count_events(&events, event_types::JOIN_FAULTED), 0);
    assert_eq!(left.cancelled_count(), 1);
    assert_eq!(right.cancelled_count(), 1);
    assert_eq!(stops(&events, "left"), 1);
    assert_eq!(stops(&events, "right"), 1);
}

#[tokio::test]
async fn test_both_sides_failing_records_one_fault() {
    let left = Arc::new(FailingContextSource::new(PipeError::faulted("left down")).with_delay(ms(5)));
    let right = Arc::new(FailingContextSource::new(PipeError::faulted("right down")).with_delay(ms(5)));
    let (join, events) = with_events(test_join(left, right, Arc::new(TestJoinBuilder::new())));

    let err = assert_err!(join.create_join_context(outer_agent(), CancellationToken::shared()).await);

    assert!(err == PipeError::faulted("left down") || err == PipeError::faulted("right down"));
    wait_for_event(&events, event_types::JOIN_DRAINED).await;
    assert_eq!(count_events(&events, event_types::JOIN_FAULTED), 1);
    assert_eq!(stops(&events, "left"), 1);
    assert_eq!(stops(&events, "right"), 1);
}

#[tokio::test]
async fn test_cancellation_after_resolution_releases_sides_once() {
    let left = Arc::new(MockContextSource::new(LeftContext::shared("L")));
    let right = Arc::new(MockContextSource::new(RightContext::shared("R")));
    let (join, events) = with_events(mock_join(&left, &right));
    let outer = outer_agent();
    let token = CancellationToken::shared();

    assert_ok!(join.create_join_context(outer.clone(), token.clone()).await);
    token.cancel("shutdown");
    wait_for_event(&events, event_types::JOIN_DRAINED).await;

    assert_eq!(outer.status(), AgentStatus::Created);
    assert_eq!(stops(&events, "left"), 1);
    assert_eq!(stops(&events, "right"), 1);
    assert_eq!(count_events(&events, event_types::JOIN_CANCELED), 0);
}

#[tokio::test]
async fn test_fault_after_resolution_keeps_created_result() {
    let left = Arc::new(
        MockContextSource::new(LeftContext::shared("L")).fault_after_send(PipeError::faulted("connection reset")),
    );
    let right = Arc::new(MockContextSource::new(RightContext::shared("R")));
    let (join, events) = with_events(mock_join(&left, &right));
    let outer = outer_agent();

    let combined = assert_ok!(join.create_join_context(outer.clone(), CancellationToken::shared()).await);
    outer.set_completed();
    wait_for_event(&events, event_types::JOIN_DRAINED).await;

    let observed = assert_ok!(outer.context().await);
    assert!(Arc::ptr_eq(&observed, &combined));
    assert_eq!(left.finished_count(), 1);
    assert_eq!(count_events(&events, event_types::JOIN_FAULTED), 0);
}

#[tokio::test]
async fn test_combine_failure_faults_join() {
    let left = Arc::new(MockContextSource::new(LeftContext::shared("L")));
    let right = Arc::new(MockContextSource::new(RightContext::shared("R")));
    let builder = Arc::new(TestJoinBuilder::failing(PipeError::faulted("incompatible")));
    let (join, events) = with_events(test_join(left, right, builder.clone()));

    let result = join.create_join_context(outer_agent(), CancellationToken::shared()).await;

    assert_faulted_with(&result, &PipeError::faulted("incompatible"));
    assert_eq!(builder.combined_count(), 1);
    wait_for_event(&events, event_types::JOIN_DRAINED).await;
    assert_eq!(stops(&events, "left"), 1);
    assert_eq!(stops(&events, "right"), 1);
}

/// Finishes without ever calling the pipe it was given.
struct SilentSource;

#[async_trait]
impl PipeContextSource<RightContext> for SilentSource {
    async fn send(&self, _pipe: Arc<dyn Pipe<RightContext>>, _token: Arc<CancellationToken>) -> PipeResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_production_without_context_faults_join() {
    let left = Arc::new(MockContextSource::new(LeftContext::shared("L")));
    let (join, events) = with_events(test_join(left, Arc::new(SilentSource), Arc::new(TestJoinBuilder::new())));

    let result = join.create_join_context(outer_agent(), CancellationToken::shared()).await;

    assert_faulted_with(&result, &PipeError::NoContext(JoinSide::Right));
    wait_for_event(&events, event_types::JOIN_DRAINED).await;
    assert_eq!(stops(&events, "left"), 1);
}

#[tokio::test]
async fn test_consumer_completing_early_stops_join() {
    let left = Arc::new(PendingContextSource::new());
    let right = Arc::new(PendingContextSource::new());
    let token = CancellationToken::shared();
    let join = test_join(left, right, Arc::new(TestJoinBuilder::new()));
    let outer = outer_agent();
    outer.set_completed();

    let result = join.create_join_context(outer, token.clone()).await;

    assert!(matches!(result, Err(PipeError::Stopped(_))));
    token.cancel("test over");
}

#[tokio::test]
async fn test_drain_timeout_detaches_stubborn_production() {
    let left = Arc::new(StubbornSource {
        context: LeftContext::shared("L"),
    });
    let right = Arc::new(MockContextSource::new(RightContext::shared("R")));
    let options = JoinOptions::new().with_drain_timeout(ms(20));
    let join = test_join(left, right, Arc::new(TestJoinBuilder::new()))
        .with_options(options)
        .unwrap();
    let (join, events) = with_events(join);
    let outer = outer_agent();

    assert_ok!(join.create_join_context(outer.clone(), CancellationToken::shared()).await);
    outer.set_completed();
    wait_for_event(&events, event_types::JOIN_CLEANUP_COMPLETED).await;
    tokio::time::sleep(ms(60)).await;

    assert_eq!(stops(&events, "left"), 1);
    assert_eq!(count_events(&events, event_types::JOIN_DRAINED), 0);
}

#[tokio::test]
async fn test_custom_stop_reason_reaches_sides() {
    let left = Arc::new(MockContextSource::new(LeftContext::shared("L")));
    let right = Arc::new(MockContextSource::new(RightContext::shared("R")));
    let join = mock_join(&left, &right)
        .with_options(JoinOptions::new().with_name("bus").with_stop_reason("Released"))
        .unwrap();
    let (join, events) = with_events(join);
    let outer = outer_agent();

    assert_ok!(join.create_join_context(outer.clone(), CancellationToken::shared()).await);
    outer.set_completed();
    wait_for_event(&events, event_types::JOIN_CLEANUP_COMPLETED).await;

    let stopped = events.events_of_type(event_types::AGENT_STOPPED);
    assert_eq!(stopped.len(), 2);
    assert!(stopped.iter().all(|event| event.field("reason") == Some("Released")));
    assert_eq!(count_agent_events(&events, event_types::AGENT_STOPPED, "bus:left"), 1);
}

#[test]
fn test_invalid_options_are_rejected() {
    let left = Arc::new(MockContextSource::new(LeftContext::shared("L")));
    let right = Arc::new(MockContextSource::new(RightContext::shared("R")));

    let result = mock_join(&left, &right).with_options(JoinOptions::new().with_stop_reason(""));

    assert!(matches!(result, Err(PipeError::Config(_))));
}

#[tokio::test]
async fn test_create_context_through_supervisor() {
    let supervisor = Supervisor::new("bus");
    let left = Arc::new(MockContextSource::new(LeftContext::shared("L")));
    let right = Arc::new(MockContextSource::new(RightContext::shared("R")));
    let (join, events) = with_events(mock_join(&left, &right));

    let outer = join.create_context(&supervisor);
    let combined = assert_ok!(outer.context().await);

    assert_eq!(combined.label, "L+R");
    assert_eq!(outer.name(), "join");
    assert_eq!(supervisor.agent_count(), 1);

    supervisor.stop("Shutdown").await;
    wait_for_event(&events, event_types::JOIN_DRAINED).await;

    assert!(outer.is_completed());
    assert_eq!(stops(&events, "left"), 1);
    assert_eq!(stops(&events, "right"), 1);
}

#[tokio::test]
async fn test_create_context_after_supervisor_stop_starts_nothing() {
    let supervisor = Supervisor::default();
    supervisor.stop("Shutdown").await;
    let left = Arc::new(MockContextSource::new(LeftContext::shared("L")));
    let right = Arc::new(MockContextSource::new(RightContext::shared("R")));
    let join = mock_join(&left, &right);

    let outer = join.create_context(&supervisor);
    tokio::time::sleep(ms(10)).await;

    assert_canceled(&outer.context().await);
    assert_eq!(left.send_count(), 0);
    assert_eq!(right.send_count(), 0);
}

#[tokio::test]
async fn test_create_active_context_shares_existing() {
    let supervisor = Supervisor::default();
    let left = Arc::new(MockContextSource::new(LeftContext::shared("L")));
    let right = Arc::new(MockContextSource::new(RightContext::shared("R")));
    let builder = Arc::new(TestJoinBuilder::new());
    let join = test_join(left.clone(), right, builder.clone());

    let outer = join.create_context(&supervisor);
    assert_ok!(outer.context().await);

    let active = join.create_active_context(&supervisor, ContextHandle::new(outer.clone()), CancellationToken::shared());
    let shared = assert_ok!(active.context().await);

    assert_eq!(shared.label, "L+R:shared");
    assert!(Arc::ptr_eq(&shared.left().expect("left payload"), left.context()));
    assert_eq!(builder.shared_count(), 1);
    assert_eq!(supervisor.agent_count(), 2);

    supervisor.stop("Shutdown").await;
}

#[tokio::test]
async fn test_create_active_context_propagates_fault() {
    let supervisor = Supervisor::default();
    let left = Arc::new(MockContextSource::new(LeftContext::shared("L")));
    let right = Arc::new(MockContextSource::new(RightContext::shared("R")));
    let join = mock_join(&left, &right);

    let existing = supervisor.add_async_context::<CombinedContext>("existing");
    existing.faulted(PipeError::connect_failed("gone"));

    let active = join.create_active_context(&supervisor, ContextHandle::new(existing), CancellationToken::shared());
    let result = active.context().await;

    assert_faulted_with(&result, &PipeError::connect_failed("gone"));
    assert_eq!(active.status(), AgentStatus::Faulted);
}

#[tokio::test]
async fn test_supervisor_stop_before_resolution_cancels_join() {
    let supervisor = Supervisor::new("bus");
    let left = Arc::new(PendingContextSource::new());
    let right = Arc::new(PendingContextSource::new());
    let (join, events) = with_events(test_join(left.clone(), right.clone(), Arc::new(TestJoinBuilder::new())));

    let outer = join.create_context(&supervisor);
    tokio::time::sleep(ms(1)).await;
    supervisor.stop("Shutdown").await;

    let result = outer.context().await;
    assert_canceled(&result);
    assert_eq!(outer.status(), AgentStatus::Canceled);

    wait_for_event(&events, event_types::JOIN_DRAINED).await;
    assert_eq!(count_events(&events, event_types::JOIN_CANCELED), 1);
    assert_eq!(count_events(&events, event_types::JOIN_FAULTED), 0);
    assert_eq!(stops(&events, "left"), 1);
    assert_eq!(stops(&events, "right"), 1);
    assert_eq!(left.cancelled_count(), 1);
    assert_eq!(right.cancelled_count(), 1);
}

#[tokio::test]
async fn test_completed_joins_leave_supervisor() {
    let supervisor = Supervisor::new("bus");
    let left = Arc::new(MockContextSource::new(LeftContext::shared("L")));
    let right = Arc::new(MockContextSource::new(RightContext::shared("R")));
    let (join, events) = with_events(mock_join(&left, &right));

    for round in 1..=5 {
        let outer = join.create_context(&supervisor);
        assert_ok!(outer.context().await);
        outer.set_completed();
        wait_until(|| count_events(&events, event_types::JOIN_DRAINED) == round).await;
    }

    wait_until(|| supervisor.agent_count() == 0).await;
    assert_eq!(stops(&events, "left"), 5);
    assert_eq!(stops(&events, "right"), 5);
}
