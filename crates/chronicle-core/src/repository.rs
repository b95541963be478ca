//! Event-sourced repository: load, commit and command execution.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::aggregate::{Aggregate, Root};
use crate::clock::Clock;
use crate::command::Command;
use crate::envelope::EventEnvelope;
use crate::error::DomainError;
use crate::projection::ProjectionRunner;
use crate::replay::ReplayEngine;
use crate::snapshot::{Snapshot, SnapshotPolicy};
use crate::store::{EventStore, SnapshotStore};

/// Attempts `Repository::execute` makes before surfacing a conflict.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Unit-of-work boundary over the event, snapshot and projection machinery.
#[derive(Clone)]
pub struct Repository {
    events: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotStore>,
    replay: ReplayEngine,
    clock: Arc<dyn Clock>,
    snapshot_policy: SnapshotPolicy,
    max_attempts: u32,
    synchronous_projections: Vec<Arc<ProjectionRunner>>,
}

impl Repository {
    /// Creates a repository with snapshots disabled and no synchronous
    /// projections.
    #[must_use]
    pub fn new(
        events: Arc<dyn EventStore>,
        snapshots: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let replay = ReplayEngine::new(Arc::clone(&events), Arc::clone(&snapshots));
        Self {
            events,
            snapshots,
            replay,
            clock,
            snapshot_policy: SnapshotPolicy::Never,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            synchronous_projections: Vec::new(),
        }
    }

    /// Sets when snapshots are taken after a commit.
    #[must_use]
    pub fn with_snapshot_policy(mut self, policy: SnapshotPolicy) -> Self {
        self.snapshot_policy = policy;
        self
    }

    /// Sets how many times `execute` runs a command before giving up on
    /// concurrency conflicts.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Runs `runner` inline after every successful commit to one of its
    /// aggregate types.
    #[must_use]
    pub fn with_synchronous_projection(mut self, runner: Arc<ProjectionRunner>) -> Self {
        self.synchronous_projections.push(runner);
        self
    }

    /// The replay engine backing this repository.
    #[must_use]
    pub fn replay(&self) -> &ReplayEngine {
        &self.replay
    }

    /// Loads an aggregate, or `None` if its stream is empty.
    ///
    /// # Errors
    ///
    /// See [`ReplayEngine::load`].
    pub async fn load<A: Aggregate>(
        &self,
        aggregate_id: &str,
    ) -> Result<Option<Root<A>>, DomainError> {
        self.replay.load::<A>(aggregate_id).await
    }

    /// Loads an aggregate, or a fresh one at version 0 if its stream is
    /// empty.
    ///
    /// # Errors
    ///
    /// See [`ReplayEngine::load`].
    pub async fn load_or_new<A: Aggregate>(
        &self,
        aggregate_id: &str,
    ) -> Result<Root<A>, DomainError> {
        Ok(self
            .replay
            .load::<A>(aggregate_id)
            .await?
            .unwrap_or_else(|| Root::new(aggregate_id)))
    }

    /// Appends the root's pending events at its committed version.
    ///
    /// Pending events are cleared only once the append succeeded; on error
    /// the root is left untouched. Snapshotting and synchronous projections
    /// run afterwards and never fail the commit, since the events are
    /// already durable.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if the stream moved since
    /// the root was loaded, or any append error.
    #[instrument(skip(self, root), fields(stream = %root.stream(), version = root.version()))]
    pub async fn commit<A: Aggregate>(
        &self,
        root: &mut Root<A>,
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        if !root.has_pending_events() {
            return Ok(Vec::new());
        }
        let new_events = root.to_new_events()?;
        let previous = root.version();
        let envelopes = self
            .events
            .append(root.stream(), previous, new_events)
            .await?;
        let committed = envelopes.last().map_or(previous, |e| e.version);
        root.mark_committed(committed);

        let snapshotted = if self.snapshot_policy.should_snapshot(previous, committed) {
            self.snapshot(root).await
        } else {
            Ok(())
        };
        if let Err(e) = snapshotted {
            warn!(stream = %root.stream(), error = %e, "snapshot after commit failed");
        }
        self.project(root).await;

        Ok(envelopes)
    }

    /// Writes a snapshot of the root's committed state.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the root has uncommitted events,
    /// `DomainError::SnapshotAheadOfStream` if the root claims a version the
    /// store has not confirmed, or any store error.
    pub async fn snapshot<A: Aggregate>(&self, root: &Root<A>) -> Result<(), DomainError> {
        if root.has_pending_events() {
            return Err(DomainError::Validation(format!(
                "cannot snapshot {} with uncommitted events",
                root.stream()
            )));
        }
        let stream_version = self.events.stream_version(root.stream()).await?;
        if root.version() > stream_version {
            return Err(DomainError::SnapshotAheadOfStream {
                stream: root.stream().clone(),
                snapshot_version: root.version(),
                stream_version,
            });
        }
        let snapshot = Snapshot {
            stream: root.stream().clone(),
            version: root.version(),
            state: serde_json::to_value(root.state())?,
            taken_at: self.clock.now(),
        };
        self.snapshots.save(snapshot).await?;
        info!(stream = %root.stream(), version = root.version(), "snapshot saved");
        Ok(())
    }

    /// Loads the command's aggregate, runs `handle` against it and commits.
    ///
    /// On a concurrency conflict the aggregate is reloaded and `handle` runs
    /// again on fresh state, up to the configured attempt limit. The
    /// expected version is always taken from the reload, never reused.
    ///
    /// # Errors
    ///
    /// Returns whatever `handle` returns, `DomainError::ConcurrencyConflict`
    /// once attempts are exhausted, or any store error.
    #[instrument(
        skip(self, command, handle),
        fields(
            command_type = command.command_type(),
            correlation_id = %command.correlation_id(),
            aggregate_id = %command.aggregate_id(),
        )
    )]
    pub async fn execute<A, C, F>(
        &self,
        command: &C,
        mut handle: F,
    ) -> Result<Vec<EventEnvelope>, DomainError>
    where
        A: Aggregate,
        C: Command,
        F: FnMut(&mut Root<A>) -> Result<(), DomainError> + Send,
    {
        let aggregate_id = command.aggregate_id();
        let mut attempt = 1;
        loop {
            let mut root = self.load_or_new::<A>(&aggregate_id).await?;
            root.set_correlation_id(command.correlation_id());
            handle(&mut root)?;

            match self.commit(&mut root).await {
                Err(DomainError::ConcurrencyConflict {
                    expected, actual, ..
                }) if attempt < self.max_attempts => {
                    warn!(attempt, expected, actual, "concurrency conflict, reloading");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn project<A: Aggregate>(&self, root: &Root<A>) {
        for runner in &self.synchronous_projections {
            if !runner.handles(root.stream()) {
                continue;
            }
            if let Err(e) = runner.catch_up_stream(root.stream()).await {
                warn!(
                    projector = runner.name(),
                    stream = %root.stream(),
                    error = %e,
                    "synchronous projection did not complete"
                );
            }
        }
    }
}
