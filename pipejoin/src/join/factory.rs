//! The join orchestrator.

use super::{JoinContextBuilder, JoinOptions, PipeContextFactory};
use crate::agent::{ActiveContextAgent, Agent, ContextAgent, ContextHandle};
use crate::cancellation::CancellationToken;
use crate::context::PipeContext;
use crate::errors::{JoinSide, PipeError, PipeResult};
use crate::events::{default_sink, event_types, EventSink};
use crate::pipe::{AgentPipe, Pipe, PipeContextSource};
use crate::supervisor::Supervisor;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

type Production = Option<JoinHandle<PipeResult<()>>>;

/// Joins a left and a right production into one combined context.
///
/// Each call to [`create_context`](PipeContextFactory::create_context)
/// starts both productions concurrently and returns the supervisor agent
/// that receives the combined context. The combined context carries the
/// left and right contexts as payloads.
///
/// Requires a Tokio runtime: the join routine runs as a background task so
/// that cleanup can wait for the consumer after the context is published.
pub struct JoinContextFactory<L, R, C> {
    left_source: Arc<dyn PipeContextSource<L>>,
    left_pipe: Arc<dyn Pipe<L>>,
    right_source: Arc<dyn PipeContextSource<R>>,
    right_pipe: Arc<dyn Pipe<R>>,
    builder: Arc<dyn JoinContextBuilder<L, R, C>>,
    options: Arc<JoinOptions>,
    events: Arc<dyn EventSink>,
}

impl<L, R, C> JoinContextFactory<L, R, C>
where
    L: PipeContext,
    R: PipeContext,
    C: PipeContext,
{
    /// Creates a factory joining the two sources with default options.
    pub fn new(
        left_source: Arc<dyn PipeContextSource<L>>,
        left_pipe: Arc<dyn Pipe<L>>,
        right_source: Arc<dyn PipeContextSource<R>>,
        right_pipe: Arc<dyn Pipe<R>>,
        builder: Arc<dyn JoinContextBuilder<L, R, C>>,
    ) -> Self {
        Self {
            left_source,
            left_pipe,
            right_source,
            right_pipe,
            builder,
            options: Arc::new(JoinOptions::default()),
            events: default_sink(),
        }
    }

    /// Replaces the options after validating them.
    pub fn with_options(mut self, options: JoinOptions) -> PipeResult<Self> {
        options.validate()?;
        self.options = Arc::new(options);
        Ok(self)
    }

    /// Sets the sink receiving join and agent events.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the options in use.
    #[must_use]
    pub fn options(&self) -> &JoinOptions {
        &self.options
    }

    /// Runs a join publishing to `outer` and waits for its outcome.
    ///
    /// Returns as soon as the combined context is published (or the join
    /// fails); cleanup continues in the background until the consumer
    /// completes `outer`.
    pub async fn create_join_context(
        &self,
        outer: Arc<ContextAgent<C>>,
        token: Arc<CancellationToken>,
    ) -> PipeResult<Arc<C>> {
        let mut routine = self.spawn_join(outer.clone(), token);

        tokio::select! {
            biased;
            resolved = outer.context() => return resolved,
            finished = &mut routine => {
                if let Err(e) = finished {
                    outer.faulted(PipeError::from(e));
                }
            }
        }

        outer.context().await
    }

    fn spawn_join(&self, outer: Arc<ContextAgent<C>>, token: Arc<CancellationToken>) -> JoinHandle<()> {
        let join = self.clone();
        let join_id = Uuid::new_v4();
        let span = info_span!("join", name = %self.options.name, join_id = %join_id);

        tokio::spawn(async move { join.run(join_id, outer, token).await }.instrument(span))
    }

    async fn run(self, join_id: Uuid, outer: Arc<ContextAgent<C>>, token: Arc<CancellationToken>) {
        let left_agent = Arc::new(self.side_agent::<L>(JoinSide::Left));
        let right_agent = Arc::new(self.side_agent::<R>(JoinSide::Right));

        let mut left_task: Production = Some(start_production(
            self.left_source.clone(),
            Arc::new(AgentPipe::new(left_agent.clone(), self.left_pipe.clone())),
            token.clone(),
        ));
        let mut right_task: Production = Some(start_production(
            self.right_source.clone(),
            Arc::new(AgentPipe::new(right_agent.clone(), self.right_pipe.clone())),
            token.clone(),
        ));
        self.emit(event_types::JOIN_STARTED, join_id, None);

        let resolution = AssertUnwindSafe(self.resolve_outer(
            join_id,
            &outer,
            &left_agent,
            &mut left_task,
            &right_agent,
            &mut right_task,
            &token,
        ))
        .catch_unwind()
        .await;

        if resolution.is_err() {
            warn!("Join routine panicked before cleanup");
            outer.faulted(PipeError::Internal("Join routine panicked".to_string()));
        }

        let reason = self.options.stop_reason.as_str();
        tokio::join!(left_agent.stop(reason, &token), right_agent.stop(reason, &token));
        self.emit(event_types::JOIN_CLEANUP_COMPLETED, join_id, None);

        self.drain(join_id, left_task, right_task).await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn resolve_outer(
        &self,
        join_id: Uuid,
        outer: &ContextAgent<C>,
        left_agent: &ContextAgent<L>,
        left_task: &mut Production,
        right_agent: &ContextAgent<R>,
        right_task: &mut Production,
        token: &CancellationToken,
    ) {
        let joined = tokio::select! {
            biased;
            () = token.cancelled() => Err(PipeError::cancelled(token.reason().unwrap_or_default())),
            () = outer.completed() => Err(PipeError::Stopped("Consumer completed before the join resolved".to_string())),
            joined = async {
                tokio::try_join!(
                    wait_for_side(left_agent, left_task, JoinSide::Left),
                    wait_for_side(right_agent, right_task, JoinSide::Right),
                )
            } => joined,
        };

        let published = joined.and_then(|(left, right)| self.publish(outer, &left, &right));

        match published {
            Ok(()) => {
                self.emit(event_types::JOIN_RESOLVED, join_id, None);
                tokio::select! {
                    () = outer.completed() => debug!("Consumer completed the joined context"),
                    () = token.cancelled() => debug!("Cancelled while the joined context was in use"),
                }
            }
            Err(e) if e.is_cancelled() => {
                debug!(error = %e, "Join canceled");
                outer.resolve(Err(e));
                self.emit(event_types::JOIN_CANCELED, join_id, None);
            }
            Err(e) => {
                debug!(error = %e, "Join faulted");
                let error = e.to_string();
                outer.faulted(e);
                self.emit(event_types::JOIN_FAULTED, join_id, Some(error));
            }
        }
    }

    fn publish(&self, outer: &ContextAgent<C>, left: &Arc<L>, right: &Arc<R>) -> PipeResult<()> {
        let combined = Arc::new(self.builder.create_combined(left, right)?);

        combined.get_or_add_shared_payload(|| right.clone());
        combined.get_or_add_shared_payload(|| left.clone());

        if !outer.created(combined) {
            debug!(agent = %outer.name(), "Outer agent already resolved, combined context discarded");
        }
        Ok(())
    }

    async fn drain(&self, join_id: Uuid, left_task: Production, right_task: Production) {
        let drain = async { tokio::join!(finish(left_task), finish(right_task)) };

        let (left, right) = match self.options.drain_timeout() {
            None => drain.await,
            Some(limit) => {
                if let Ok(finished) = tokio::time::timeout(limit, drain).await {
                    finished
                } else {
                    debug!(timeout = ?limit, "Productions still running after drain timeout, detaching");
                    return;
                }
            }
        };

        for (side, result) in [(JoinSide::Left, left), (JoinSide::Right, right)] {
            if let Err(e) = result {
                debug!(side = %side, error = %e, "Faulted production");
            }
        }
        self.emit(event_types::JOIN_DRAINED, join_id, None);
    }

    fn side_agent<T: Send + Sync + 'static>(&self, side: JoinSide) -> ContextAgent<T> {
        ContextAgent::new(format!("{}:{side}", self.options.name)).with_event_sink(self.events.clone())
    }

    fn emit(&self, event_type: &str, join_id: Uuid, error: Option<String>) {
        self.events.try_emit(
            event_type,
            Some(serde_json::json!({
                "join_id": join_id.to_string(),
                "join": self.options.name,
                "error": error,
            })),
        );
    }
}

impl<L, R, C> PipeContextFactory<C> for JoinContextFactory<L, R, C>
where
    L: PipeContext,
    R: PipeContext,
    C: PipeContext,
{
    fn create_context(&self, supervisor: &Supervisor) -> Arc<ContextAgent<C>> {
        let outer = supervisor.add_async_context::<C>(self.options.name.clone());
        if !outer.is_resolved() {
            self.spawn_join(outer.clone(), supervisor.stopped().clone());
        }
        outer
    }

    fn create_active_context(
        &self,
        supervisor: &Supervisor,
        context: ContextHandle<C>,
        token: Arc<CancellationToken>,
    ) -> Arc<ActiveContextAgent<C>> {
        let builder = self.builder.clone();
        let existing = context.clone();
        supervisor.add_active_context(context, async move {
            builder.create_shared_context(existing, token).await
        })
    }
}

impl<L, R, C> Clone for JoinContextFactory<L, R, C> {
    fn clone(&self) -> Self {
        Self {
            left_source: self.left_source.clone(),
            left_pipe: self.left_pipe.clone(),
            right_source: self.right_source.clone(),
            right_pipe: self.right_pipe.clone(),
            builder: self.builder.clone(),
            options: self.options.clone(),
            events: self.events.clone(),
        }
    }
}

impl<L, R, C> std::fmt::Debug for JoinContextFactory<L, R, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinContextFactory")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn start_production<T: Send + Sync + 'static>(
    source: Arc<dyn PipeContextSource<T>>,
    pipe: Arc<dyn Pipe<T>>,
    token: Arc<CancellationToken>,
) -> JoinHandle<PipeResult<()>> {
    tokio::spawn(async move { source.send(pipe, token).await }.in_current_span())
}

/// Waits for a side's agent to resolve, surfacing the production's error if
/// the production finishes first.
async fn wait_for_side<T: Send + Sync + 'static>(
    agent: &ContextAgent<T>,
    task: &mut Production,
    side: JoinSide,
) -> PipeResult<Arc<T>> {
    let finished = match task.as_mut() {
        None => None,
        Some(handle) => tokio::select! {
            biased;
            resolved = agent.context() => return resolved,
            finished = handle => Some(finished),
        },
    };

    if let Some(finished) = finished {
        *task = None;
        flatten(finished)?;
    }

    agent
        .try_context()
        .unwrap_or(Err(PipeError::NoContext(side)))
}

async fn finish(task: Production) -> PipeResult<()> {
    match task {
        Some(handle) => flatten(handle.await),
        None => Ok(()),
    }
}

fn flatten(finished: Result<PipeResult<()>, tokio::task::JoinError>) -> PipeResult<()> {
    finished.map_err(PipeError::from).and_then(|result| result)
}
