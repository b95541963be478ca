//! Aggregate replay engine.
//!
//! Rebuilds a [`Root`] from the latest snapshot (if any) plus the events
//! appended after it. The engine only reads; concurrent writers are caught
//! later by the event store's optimistic concurrency check.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, instrument, warn};

use crate::aggregate::{Aggregate, Root};
use crate::envelope::EventEnvelope;
use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::store::{EventStore, SnapshotStore};
use crate::stream::StreamId;

/// Loads aggregates by replaying their streams.
#[derive(Clone)]
pub struct ReplayEngine {
    events: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl ReplayEngine {
    /// Creates a replay engine over the given stores.
    #[must_use]
    pub fn new(events: Arc<dyn EventStore>, snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self { events, snapshots }
    }

    /// Loads the aggregate, starting from its latest snapshot.
    ///
    /// Returns `None` if the stream has neither a snapshot nor events.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StorageUnavailable` if a store fails,
    /// `DomainError::Serialization` if an event cannot be decoded, or
    /// `DomainError::CorruptStream` if versions are not contiguous.
    #[instrument(skip(self), fields(aggregate_type = A::AGGREGATE_TYPE))]
    pub async fn load<A: Aggregate>(&self, aggregate_id: &str) -> Result<Option<Root<A>>, DomainError> {
        let stream = StreamId::new(A::AGGREGATE_TYPE, aggregate_id);
        let (state, version) = self.starting_point::<A>(&stream).await?;
        let envelopes = self.events.load(&stream, version).await?;
        if version == 0 && envelopes.is_empty() {
            return Ok(None);
        }
        let (state, version) = hydrate(&stream, state, version, &envelopes)?;
        debug!(
            %stream,
            version,
            replayed = envelopes.len(),
            "aggregate loaded"
        );
        Ok(Some(Root::hydrated(stream, state, version)))
    }

    /// Loads the aggregate by replaying every event, ignoring snapshots.
    ///
    /// # Errors
    ///
    /// Same as [`ReplayEngine::load`].
    #[instrument(skip(self), fields(aggregate_type = A::AGGREGATE_TYPE))]
    pub async fn load_without_snapshot<A: Aggregate>(
        &self,
        aggregate_id: &str,
    ) -> Result<Option<Root<A>>, DomainError> {
        let stream = StreamId::new(A::AGGREGATE_TYPE, aggregate_id);
        let envelopes = self.events.load(&stream, 0).await?;
        if envelopes.is_empty() {
            return Ok(None);
        }
        let (state, version) = hydrate(&stream, A::default(), 0, &envelopes)?;
        Ok(Some(Root::hydrated(stream, state, version)))
    }

    /// Replays the stream independently twice from scratch, and once more
    /// from its snapshot if one exists, and checks all results agree.
    ///
    /// Returns the checksum of the agreed state, or `None` for an empty
    /// stream.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ReplayDeterminismViolation` if the replays
    /// disagree, plus any error [`ReplayEngine::load`] can return.
    #[instrument(skip(self), fields(aggregate_type = A::AGGREGATE_TYPE))]
    pub async fn verify<A: Aggregate>(&self, aggregate_id: &str) -> Result<Option<String>, DomainError> {
        let Some(first) = self.load_without_snapshot::<A>(aggregate_id).await? else {
            return Ok(None);
        };
        let reference = checksum(first.state())?;

        // Replays are compared at the version the first one reached, so
        // appends racing with verification do not count as divergence.
        let stream = first.stream().clone();
        let envelopes = self.events.load(&stream, 0).await?;
        let prefix: Vec<EventEnvelope> = envelopes
            .into_iter()
            .take_while(|e| e.version <= first.version())
            .collect();
        let (second, _) = hydrate(&stream, A::default(), 0, &prefix)?;
        ensure_same(&stream, first.version(), &reference, &checksum(&second)?)?;

        let snapshot = self
            .snapshot_state::<A>(&stream)
            .await?
            .filter(|(_, version)| *version <= first.version());
        if let Some((state, version)) = snapshot {
            let tail: Vec<EventEnvelope> = prefix
                .into_iter()
                .filter(|e| e.version > version)
                .collect();
            let (from_snapshot, _) = hydrate(&stream, state, version, &tail)?;
            ensure_same(
                &stream,
                first.version(),
                &reference,
                &checksum(&from_snapshot)?,
            )?;
        }

        Ok(Some(reference))
    }

    async fn starting_point<A: Aggregate>(&self, stream: &StreamId) -> Result<(A, i64), DomainError> {
        Ok(self
            .snapshot_state::<A>(stream)
            .await?
            .unwrap_or_else(|| (A::default(), 0)))
    }

    /// Decodes the latest snapshot. A snapshot that no longer decodes is
    /// ignored; the stream itself is the source of truth.
    async fn snapshot_state<A: Aggregate>(
        &self,
        stream: &StreamId,
    ) -> Result<Option<(A, i64)>, DomainError> {
        let Some(snapshot) = self.snapshots.load_latest(stream).await? else {
            return Ok(None);
        };
        match A::deserialize(&snapshot.state) {
            Ok(state) => Ok(Some((state, snapshot.version))),
            Err(e) => {
                warn!(
                    %stream,
                    version = snapshot.version,
                    error = %e,
                    "discarding undecodable snapshot"
                );
                Ok(None)
            }
        }
    }
}

/// Folds `envelopes` onto `state`, which reflects the stream up to `version`.
///
/// # Errors
///
/// Returns `DomainError::CorruptStream` if an envelope is not exactly the
/// next version, or `DomainError::Serialization` if it cannot be decoded.
pub fn hydrate<A: Aggregate>(
    stream: &StreamId,
    state: A,
    version: i64,
    envelopes: &[EventEnvelope],
) -> Result<(A, i64), DomainError> {
    envelopes
        .iter()
        .try_fold((state, version), |(state, current), envelope| {
            if envelope.version != current + 1 {
                return Err(DomainError::CorruptStream {
                    stream: stream.clone(),
                    expected: current + 1,
                    found: envelope.version,
                });
            }
            let event = A::Event::from_payload(&envelope.event_type, &envelope.payload)?;
            Ok((state.apply(&event), envelope.version))
        })
}

/// SHA-256 of the state's JSON form, hex encoded.
///
/// # Errors
///
/// Returns `DomainError::Serialization` if the state cannot be encoded.
pub fn checksum<A: Aggregate>(state: &A) -> Result<String, DomainError> {
    let bytes = serde_json::to_vec(state)?;
    let digest = Sha256::digest(&bytes);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    Ok(hex)
}

fn ensure_same(
    stream: &StreamId,
    version: i64,
    first: &str,
    second: &str,
) -> Result<(), DomainError> {
    if first == second {
        return Ok(());
    }
    error!(
        %stream,
        version,
        first,
        second,
        "replay determinism violation"
    );
    Err(DomainError::ReplayDeterminismViolation {
        stream: stream.clone(),
        version,
        first: first.to_owned(),
        second: second.to_owned(),
    })
}
