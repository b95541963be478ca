//! Domain error types.

use thiserror::Error;

use crate::stream::StreamId;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was expected to exist but its stream is empty.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(StreamId),

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on stream {stream}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream that had the conflict.
        stream: StreamId,
        /// The version the writer expected the stream to be at.
        expected: i64,
        /// The actual stream version found.
        actual: i64,
    },

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// The persistence substrate could not be reached or failed mid-operation.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A payload or aggregate state could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A snapshot write would have gone past the last appended event.
    #[error(
        "snapshot for {stream} at version {snapshot_version} is ahead of stream version {stream_version}"
    )]
    SnapshotAheadOfStream {
        /// The stream being snapshotted.
        stream: StreamId,
        /// The version the snapshot claimed.
        snapshot_version: i64,
        /// The stream head at the time of the write.
        stream_version: i64,
    },

    /// Events read back from a stream were not contiguous.
    #[error("corrupt stream {stream}: expected version {expected}, found {found}")]
    CorruptStream {
        /// The stream that failed the check.
        stream: StreamId,
        /// The version that should have come next.
        expected: i64,
        /// The version that was actually read.
        found: i64,
    },

    /// Two independent replays of the same stream produced different state.
    #[error("replay determinism violation on {stream} at version {version}: {first} != {second}")]
    ReplayDeterminismViolation {
        /// The stream that was replayed.
        stream: StreamId,
        /// The version both replays reached.
        version: i64,
        /// Checksum of the first replay.
        first: String,
        /// Checksum of the second replay.
        second: String,
    },
}

impl DomainError {
    /// Whether the caller may retry the operation after reloading.
    ///
    /// Only concurrency conflicts and storage outages qualify; every other
    /// variant is either a caller error or an integrity breach.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. } | Self::StorageUnavailable(_)
        )
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_conflict_is_retryable() {
        let err = DomainError::ConcurrencyConflict {
            stream: StreamId::new("order", "1"),
            expected: 0,
            actual: 1,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_integrity_errors_are_not_retryable() {
        let stream = StreamId::new("order", "1");
        assert!(
            !DomainError::CorruptStream {
                stream: stream.clone(),
                expected: 2,
                found: 3,
            }
            .is_retryable()
        );
        assert!(
            !DomainError::ReplayDeterminismViolation {
                stream,
                version: 1,
                first: "a".into(),
                second: "b".into(),
            }
            .is_retryable()
        );
        assert!(!DomainError::Validation("bad".into()).is_retryable());
    }

    #[test]
    fn test_conflict_message_names_stream_and_versions() {
        let err = DomainError::ConcurrencyConflict {
            stream: StreamId::new("order", "42"),
            expected: 0,
            actual: 1,
        };
        assert_eq!(
            err.to_string(),
            "concurrency conflict on stream order/42: expected version 0, found 1"
        );
    }
}
