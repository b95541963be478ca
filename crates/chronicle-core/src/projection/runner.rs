//! Drives a [`Projector`] from the event store.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use super::{ProjectionError, Projector, ProjectorState};
use crate::envelope::EventEnvelope;
use crate::error::DomainError;
use crate::retry::RetryPolicy;
use crate::rng::{DeterministicRng, SystemRng};
use crate::store::{CursorStore, EventStore};
use crate::stream::StreamId;

/// Default interval between polling sweeps.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Why a stream stopped advancing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaltedStream {
    /// The version whose handler failed permanently.
    pub version: i64,
    /// How many times the handler ran.
    pub attempts: u32,
    /// The last handler error.
    pub reason: String,
}

/// Outcome of a sweep over every stream a projector consumes.
#[derive(Debug, Default)]
pub struct CatchUpReport {
    /// Envelopes applied during the sweep.
    pub processed: usize,
    /// Streams that could not be advanced, with the reason.
    pub failed: Vec<(StreamId, String)>,
}

impl CatchUpReport {
    /// True if every stream caught up.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Resets the observable state to idle when processing ends, including
/// when the processing future is dropped.
struct Busy<'a>(&'a watch::Sender<ProjectorState>);

impl<'a> Busy<'a> {
    fn enter(state: &'a watch::Sender<ProjectorState>) -> Self {
        state.send_replace(ProjectorState::Processing);
        Self(state)
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.send_replace(ProjectorState::Idle);
    }
}

/// Feeds envelopes to one projector and tracks its per-stream cursors.
pub struct ProjectionRunner {
    projector: Arc<dyn Projector>,
    events: Arc<dyn EventStore>,
    cursors: Arc<dyn CursorStore>,
    retry: RetryPolicy,
    poll_interval: Duration,
    rng: Mutex<Box<dyn DeterministicRng>>,
    state: watch::Sender<ProjectorState>,
    halted: Mutex<BTreeMap<StreamId, HaltedStream>>,
    // Serializes processing so a synchronous catch-up and the runner loop
    // never interleave envelopes of the same projector.
    gate: tokio::sync::Mutex<()>,
}

impl ProjectionRunner {
    /// Creates a runner with the default retry policy and poll interval.
    #[must_use]
    pub fn new(
        projector: Arc<dyn Projector>,
        events: Arc<dyn EventStore>,
        cursors: Arc<dyn CursorStore>,
    ) -> Self {
        let (state, _) = watch::channel(ProjectorState::Idle);
        Self {
            projector,
            events,
            cursors,
            retry: RetryPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            rng: Mutex::new(Box::new(SystemRng::new())),
            state,
            halted: Mutex::new(BTreeMap::new()),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Sets the handler retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the polling interval used by [`ProjectionRunner::run`].
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Replaces the RNG used for backoff jitter.
    #[must_use]
    pub fn with_rng(mut self, rng: Box<dyn DeterministicRng>) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    /// The projector's name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.projector.name()
    }

    /// Whether this runner consumes `stream`.
    #[must_use]
    pub fn handles(&self, stream: &StreamId) -> bool {
        self.projector
            .aggregate_types()
            .contains(&stream.aggregate_type.as_str())
    }

    /// Current processing state.
    #[must_use]
    pub fn state(&self) -> ProjectorState {
        *self.state.borrow()
    }

    /// Watches processing state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ProjectorState> {
        self.state.subscribe()
    }

    /// Streams halted by a permanently failing handler.
    #[must_use]
    pub fn halted_streams(&self) -> Vec<(StreamId, HaltedStream)> {
        self.halted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(stream, halt)| (stream.clone(), halt.clone()))
            .collect()
    }

    /// Lets a halted stream be retried from its cursor. Returns whether the
    /// stream was halted.
    pub fn resume(&self, stream: &StreamId) -> bool {
        let resumed = self
            .halted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(stream)
            .is_some();
        if resumed {
            info!(projector = self.name(), %stream, "halted stream resumed");
        }
        resumed
    }

    /// Applies every envelope of `stream` after its cursor.
    ///
    /// Returns how many envelopes were applied.
    ///
    /// # Errors
    ///
    /// Returns `ProjectionError::Halted` if the stream is halted,
    /// `ProjectionError::Handler` if a handler failed permanently (the
    /// stream is halted as a result), `ProjectionError::Gap` if the store
    /// skipped a version, or `ProjectionError::Store` on storage failures.
    #[instrument(skip(self), fields(projector = self.name()))]
    pub async fn catch_up_stream(&self, stream: &StreamId) -> Result<usize, ProjectionError> {
        if !self.handles(stream) {
            return Ok(0);
        }
        let _gate = self.gate.lock().await;
        let _busy = Busy::enter(&self.state);
        let cursor = self.cursors.load(self.name(), stream).await?;
        self.advance(stream, cursor).await
    }

    /// Sweeps every consumed stream, advancing those whose head is past
    /// their cursor. A failing stream does not hold back the others.
    ///
    /// # Errors
    ///
    /// Returns `ProjectionError::Store` if stream heads or cursors cannot be
    /// read; per-stream failures are reported in the [`CatchUpReport`].
    #[instrument(skip(self), fields(projector = self.name()))]
    pub async fn catch_up(&self) -> Result<CatchUpReport, ProjectionError> {
        let _gate = self.gate.lock().await;
        let _busy = Busy::enter(&self.state);
        self.sweep().await
    }

    /// Clears the read model and cursors, lifts every halt and replays the
    /// whole history.
    ///
    /// # Errors
    ///
    /// Returns `ProjectionError::Store` if the read model or cursors cannot
    /// be reset, or if the sweep cannot start.
    #[instrument(skip(self), fields(projector = self.name()))]
    pub async fn rebuild(&self) -> Result<CatchUpReport, ProjectionError> {
        let _gate = self.gate.lock().await;
        let _busy = Busy::enter(&self.state);
        info!("rebuilding projection");
        self.cursors.reset(self.name()).await?;
        self.projector.reset().await?;
        self.halted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        let report = self.sweep().await?;
        info!(
            processed = report.processed,
            failed = report.failed.len(),
            "projection rebuilt"
        );
        Ok(report)
    }

    /// Processes notifications and periodic sweeps until `shutdown` flips to
    /// `true` or its sender is dropped.
    ///
    /// # Errors
    ///
    /// Returns `ProjectionError::Store` if the append subscription cannot be
    /// set up.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), ProjectionError> {
        if *shutdown.borrow() {
            return Ok(());
        }
        let mut notifications = self.events.subscribe().await?;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            projector = self.name(),
            poll_interval_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "projection runner started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(stream) = notifications.recv() => {
                    if let Err(e) = self.catch_up_stream(&stream).await {
                        warn!(projector = self.name(), %stream, error = %e, "catch-up after notification failed");
                    }
                }
                _ = ticker.tick() => {
                    match self.catch_up().await {
                        Ok(report) if report.processed > 0 || !report.is_clean() => {
                            debug!(
                                projector = self.name(),
                                processed = report.processed,
                                failed = report.failed.len(),
                                "poll sweep finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => warn!(projector = self.name(), error = %e, "poll sweep failed"),
                    }
                }
            }
        }

        info!(projector = self.name(), "projection runner stopped");
        Ok(())
    }

    async fn sweep(&self) -> Result<CatchUpReport, ProjectionError> {
        let heads = self
            .events
            .stream_heads(self.projector.aggregate_types())
            .await?;
        let cursors = self.cursors.load_all(self.name()).await?;
        let mut report = CatchUpReport::default();

        for (stream, head) in heads {
            let cursor = cursors.get(&stream).copied().unwrap_or(0);
            if head <= cursor {
                continue;
            }
            match self.advance(&stream, cursor).await {
                Ok(applied) => report.processed += applied,
                Err(e) => report.failed.push((stream, e.to_string())),
            }
        }
        Ok(report)
    }

    async fn advance(&self, stream: &StreamId, cursor: i64) -> Result<usize, ProjectionError> {
        let halted_at = self
            .halted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(stream)
            .map(|halt| halt.version);
        if let Some(version) = halted_at {
            return Err(ProjectionError::Halted {
                projector: self.name().to_owned(),
                stream: stream.clone(),
                version,
            });
        }

        let envelopes = self.events.load(stream, cursor).await?;
        let mut position = cursor;
        for envelope in &envelopes {
            if envelope.version != position + 1 {
                return Err(ProjectionError::Gap {
                    projector: self.name().to_owned(),
                    stream: stream.clone(),
                    expected: position + 1,
                    found: envelope.version,
                });
            }
            self.handle_with_retry(envelope).await?;
            self.cursors
                .save(self.name(), stream, envelope.version)
                .await?;
            position = envelope.version;
        }
        Ok(envelopes.len())
    }

    async fn handle_with_retry(&self, envelope: &EventEnvelope) -> Result<(), ProjectionError> {
        let mut attempt = 0;
        loop {
            let Err(err) = self.projector.handle(envelope).await else {
                return Ok(());
            };
            if attempt >= self.retry.max_retries {
                return Err(self.halt(envelope, attempt + 1, err));
            }
            let delay = {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                self.retry.delay_for_attempt(attempt, &mut **rng)
            };
            warn!(
                projector = self.name(),
                stream = %envelope.stream,
                version = envelope.version,
                attempt = attempt + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "projection handler failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn halt(
        &self,
        envelope: &EventEnvelope,
        attempts: u32,
        source: DomainError,
    ) -> ProjectionError {
        error!(
            alarm = "projector_halted",
            projector = self.name(),
            stream = %envelope.stream,
            version = envelope.version,
            attempts,
            error = %source,
            "projection handler failed permanently; stream halted until resumed or rebuilt"
        );
        self.halted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                envelope.stream.clone(),
                HaltedStream {
                    version: envelope.version,
                    attempts,
                    reason: source.to_string(),
                },
            );
        ProjectionError::Handler {
            projector: self.name().to_owned(),
            stream: envelope.stream.clone(),
            version: envelope.version,
            attempts,
            source,
        }
    }
}
