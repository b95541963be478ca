//! Storage backends for Chronicle.
//!
//! [`memory`] keeps everything in process. The `pg_*` modules persist to
//! `PostgreSQL`; run [`schema::MIGRATOR`] against the pool before use.

pub mod memory;
pub mod pg_cursor_store;
pub mod pg_event_store;
pub mod pg_snapshot_store;
pub mod schema;

use chronicle_core::error::DomainError;

/// Maps a `sqlx` failure to `DomainError::StorageUnavailable`.
#[must_use]
pub fn storage_error(e: sqlx::Error) -> DomainError {
    DomainError::StorageUnavailable(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlx_failure_maps_to_storage_unavailable() {
        let err = storage_error(sqlx::Error::PoolTimedOut);

        match err {
            DomainError::StorageUnavailable(msg) => assert!(msg.contains("timed out")),
            other => panic!("expected StorageUnavailable, got {other:?}"),
        }
        assert!(storage_error(sqlx::Error::PoolClosed).is_retryable());
    }
}
