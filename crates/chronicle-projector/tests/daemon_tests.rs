//! Integration tests for the projector daemon over `PostgreSQL`.

mod common;

use std::time::Duration;

use chrono::{TimeZone, Utc};
use chronicle_core::envelope::NewEvent;
use chronicle_core::error::DomainError;
use chronicle_core::projection::ProjectionMode;
use chronicle_core::store::EventStore;
use chronicle_core::stream::StreamId;
use chronicle_event_store::pg_event_store::PgEventStore;
use chronicle_orders::application::command_handlers::{place_order, ship_order};
use chronicle_orders::application::query_handlers::{get_order_summary, list_customer_orders};
use chronicle_orders::domain::aggregates::OrderStatus;
use chronicle_orders::domain::events::ORDER_PLACED_V1_EVENT_TYPE;
use chronicle_orders::read_model::{OrderSummary, OrderSummaryStore};
use chronicle_projector::pg_order_summary_store::PgOrderSummaryStore;
use sqlx::PgPool;
use tokio::sync::watch;
use uuid::Uuid;

use common::{fixed_clock, place, services, ship, test_config};

#[sqlx::test(migrations = "../../migrations")]
async fn test_placed_order_is_projected_after_catch_up(pool: PgPool) {
    // Arrange
    let services = services(pool, ProjectionMode::Asynchronous);
    place_order(&place("1", "c-1", 1250), &services.repository)
        .await
        .unwrap();

    // Act
    let before = get_order_summary("1", services.summaries.as_ref()).await;
    let report = services.runner.catch_up().await.unwrap();
    let summary = get_order_summary("1", services.summaries.as_ref())
        .await
        .unwrap();

    // Assert
    match before {
        Err(DomainError::AggregateNotFound(stream)) => assert_eq!(stream.aggregate_id, "1"),
        other => panic!("expected AggregateNotFound, got {other:?}"),
    }
    assert_eq!(report.processed, 1);
    assert!(report.is_clean());
    assert_eq!(summary.customer_id, "c-1");
    assert_eq!(summary.status, OrderStatus::Placed);
    assert_eq!(summary.line_count, 2);
    assert_eq!(summary.total_cents, 2600);
    assert_eq!(summary.currency, "EUR");
    assert_eq!(summary.last_applied_version, 1);
    assert_eq!(
        summary.updated_at,
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_second_catch_up_applies_nothing(pool: PgPool) {
    let services = services(pool, ProjectionMode::Asynchronous);
    place_order(&place("1", "c-1", 1250), &services.repository)
        .await
        .unwrap();
    services.runner.catch_up().await.unwrap();

    let report = services.runner.catch_up().await.unwrap();

    assert_eq!(report.processed, 0);
    assert_eq!(services.summaries.count().await.unwrap(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_stale_summary_write_is_ignored(pool: PgPool) {
    // Arrange
    let store = PgOrderSummaryStore::new(pool);
    let newer = OrderSummary {
        order_id: "1".to_owned(),
        customer_id: "c-1".to_owned(),
        status: OrderStatus::Shipped,
        line_count: 1,
        total_cents: 500,
        currency: "USD".to_owned(),
        tracking_number: Some("TRACK-1".to_owned()),
        last_applied_version: 2,
        updated_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
    };
    let older = OrderSummary {
        status: OrderStatus::Placed,
        tracking_number: None,
        last_applied_version: 1,
        ..newer.clone()
    };

    // Act
    let wrote_newer = store.upsert(newer.clone()).await.unwrap();
    let wrote_older = store.upsert(older).await.unwrap();
    let wrote_again = store.upsert(newer.clone()).await.unwrap();

    // Assert
    assert!(wrote_newer);
    assert!(!wrote_older);
    assert!(!wrote_again);
    assert_eq!(store.get("1").await.unwrap(), Some(newer));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_synchronous_mode_projects_before_command_returns(pool: PgPool) {
    let services = services(pool, ProjectionMode::Synchronous);

    place_order(&place("1", "c-1", 1250), &services.repository)
        .await
        .unwrap();
    ship_order(&ship("1", "TRACK-9"), &services.repository)
        .await
        .unwrap();

    let summary = get_order_summary("1", services.summaries.as_ref())
        .await
        .unwrap();
    assert_eq!(summary.status, OrderStatus::Shipped);
    assert_eq!(summary.tracking_number.as_deref(), Some("TRACK-9"));
    assert_eq!(summary.last_applied_version, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_rebuild_reproduces_incremental_read_model(pool: PgPool) {
    // Arrange
    let services = services(pool, ProjectionMode::Asynchronous);
    for (order_id, price) in [("1", 100), ("2", 200), ("3", 300)] {
        place_order(&place(order_id, "c-1", price), &services.repository)
            .await
            .unwrap();
    }
    ship_order(&ship("2", "TRACK-2"), &services.repository)
        .await
        .unwrap();
    services.runner.catch_up().await.unwrap();
    let incremental = list_customer_orders("c-1", services.summaries.as_ref())
        .await
        .unwrap();

    // Act
    let report = services.runner.rebuild().await.unwrap();
    let rebuilt = list_customer_orders("c-1", services.summaries.as_ref())
        .await
        .unwrap();

    // Assert
    assert_eq!(report.processed, 4);
    assert_eq!(incremental.len(), 3);
    assert_eq!(rebuilt, incremental);
    assert_eq!(
        rebuilt.iter().map(|s| s.order_id.as_str()).collect::<Vec<_>>(),
        vec!["1", "2", "3"]
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_legacy_placed_event_is_projected_with_default_currency(pool: PgPool) {
    // Arrange
    let services = services(pool.clone(), ProjectionMode::Asynchronous);
    let events = PgEventStore::with_clock(pool, fixed_clock());
    let stream = StreamId::new("order", "legacy");
    events
        .append(
            &stream,
            0,
            vec![NewEvent::new(
                ORDER_PLACED_V1_EVENT_TYPE,
                serde_json::json!({
                    "order_id": "legacy",
                    "customer_id": "c-9",
                    "lines": [{ "sku": "sku-1", "quantity": 3, "unit_price_cents": 700 }]
                }),
                Uuid::new_v4(),
            )],
        )
        .await
        .unwrap();

    // Act
    services.runner.catch_up().await.unwrap();

    // Assert
    let summary = get_order_summary("legacy", services.summaries.as_ref())
        .await
        .unwrap();
    assert_eq!(summary.currency, "USD");
    assert_eq!(summary.total_cents, 2100);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_run_loop_projects_new_orders_until_shutdown(pool: PgPool) {
    // Arrange
    let services = services(pool, ProjectionMode::Asynchronous);
    let config = test_config(ProjectionMode::Asynchronous);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let daemon = {
        let services = services.clone();
        tokio::spawn(async move { services.run(&config, shutdown_rx).await })
    };

    // Act
    place_order(&place("1", "c-1", 1250), &services.repository)
        .await
        .unwrap();
    let projected = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(Some(summary)) = services.summaries.get("1").await {
                return summary;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    shutdown_tx.send(true).unwrap();

    // Assert
    assert_eq!(projected.status, OrderStatus::Placed);
    tokio::time::timeout(Duration::from_secs(5), daemon)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
