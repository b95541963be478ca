//! Replay determinism and snapshot transparency.

mod common;

use chronicle_core::aggregate::Root;
use chronicle_core::envelope::NewEvent;
use chronicle_core::error::DomainError;
use chronicle_core::replay::checksum;
use chronicle_core::snapshot::SnapshotPolicy;
use chronicle_core::store::{EventStore, SnapshotStore};
use chronicle_core::stream::StreamId;
use common::{Ledger, LedgerEvent, fixture, posted};
use uuid::Uuid;

async fn seed(repository: &chronicle_core::repository::Repository, id: &str, postings: i64) {
    let mut root = Root::<Ledger>::new(id);
    root.record(LedgerEvent::Opened);
    repository.commit(&mut root).await.unwrap();
    for n in 1..=postings {
        root.record(posted(if n % 2 == 0 { "cash" } else { "sales" }, n));
        repository.commit(&mut root).await.unwrap();
    }
}

#[tokio::test]
async fn test_load_returns_none_for_empty_stream() {
    let f = fixture();

    let loaded = f.repository.load::<Ledger>("missing").await.unwrap();

    assert!(loaded.is_none());
}

#[tokio::test]
async fn test_replaying_twice_yields_identical_state() {
    // Arrange
    let f = fixture();
    seed(&f.repository, "l-1", 7).await;

    // Act
    let first = f.repository.load::<Ledger>("l-1").await.unwrap().unwrap();
    let second = f.repository.load::<Ledger>("l-1").await.unwrap().unwrap();

    // Assert
    assert_eq!(first.state(), second.state());
    assert_eq!(first.version(), 8);
    assert_eq!(
        checksum(first.state()).unwrap(),
        checksum(second.state()).unwrap()
    );
}

#[tokio::test]
async fn test_snapshot_is_transparent_to_loaded_state() {
    // Arrange
    let f = fixture();
    let repository = f
        .repository
        .clone()
        .with_snapshot_policy(SnapshotPolicy::Every(3));
    seed(&repository, "l-1", 10).await;
    let stream = StreamId::new("ledger", "l-1");
    let snapshot = f.snapshots.load_latest(&stream).await.unwrap().unwrap();
    assert_eq!(snapshot.version, 9);

    // Act
    let with_snapshot = repository.load::<Ledger>("l-1").await.unwrap().unwrap();
    f.snapshots.clear().await;
    let without_snapshot = repository.load::<Ledger>("l-1").await.unwrap().unwrap();

    // Assert
    assert_eq!(with_snapshot.state(), without_snapshot.state());
    assert_eq!(with_snapshot.version(), 11);
    assert_eq!(without_snapshot.version(), 11);
}

#[tokio::test]
async fn test_verify_agrees_across_full_and_snapshot_replays() {
    let f = fixture();
    let repository = f
        .repository
        .clone()
        .with_snapshot_policy(SnapshotPolicy::Every(2));
    seed(&repository, "l-1", 5).await;

    let checksum_value = repository
        .replay()
        .verify::<Ledger>("l-1")
        .await
        .unwrap()
        .unwrap();

    let loaded = repository.load::<Ledger>("l-1").await.unwrap().unwrap();
    assert_eq!(checksum_value, checksum(loaded.state()).unwrap());
}

#[tokio::test]
async fn test_verify_detects_snapshot_that_diverges_from_history() {
    // Arrange
    let f = fixture();
    seed(&f.repository, "l-1", 2).await;
    let stream = StreamId::new("ledger", "l-1");
    let forged = Ledger {
        opened: true,
        postings: 99,
        ..Ledger::default()
    };
    f.snapshots
        .save(chronicle_core::snapshot::Snapshot {
            stream: stream.clone(),
            version: 2,
            state: serde_json::to_value(&forged).unwrap(),
            taken_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    // Act
    let result = f.repository.replay().verify::<Ledger>("l-1").await;

    // Assert
    match result {
        Err(DomainError::ReplayDeterminismViolation { stream: s, version, .. }) => {
            assert_eq!(s, stream);
            assert_eq!(version, 3);
        }
        other => panic!("expected ReplayDeterminismViolation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_undecodable_snapshot_falls_back_to_full_replay() {
    let f = fixture();
    seed(&f.repository, "l-1", 3).await;
    let stream = StreamId::new("ledger", "l-1");
    f.snapshots
        .save(chronicle_core::snapshot::Snapshot {
            stream,
            version: 2,
            state: serde_json::json!("not a ledger"),
            taken_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    let loaded = f.repository.load::<Ledger>("l-1").await.unwrap().unwrap();

    assert_eq!(loaded.version(), 4);
    assert_eq!(loaded.state().postings, 3);
}

#[tokio::test]
async fn test_unknown_event_type_fails_load() {
    let f = fixture();
    let stream = StreamId::new("ledger", "l-1");
    f.events
        .append(
            &stream,
            0,
            vec![NewEvent::new("ledger.closed.v9", serde_json::json!({}), Uuid::new_v4())],
        )
        .await
        .unwrap();

    let result = f.repository.load::<Ledger>("l-1").await;

    assert!(matches!(result, Err(DomainError::Serialization(_))));
}
