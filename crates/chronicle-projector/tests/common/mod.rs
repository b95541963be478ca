//! Shared helpers for projector daemon integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use chronicle_core::clock::Clock;
use chronicle_core::projection::ProjectionMode;
use chronicle_core::snapshot::SnapshotPolicy;
use chronicle_orders::domain::commands::{PlaceOrder, ShipOrder};
use chronicle_orders::domain::events::OrderLine;
use chronicle_projector::config::ProjectorConfig;
use chronicle_projector::services::Services;
use chronicle_test_support::FixedClock;
use sqlx::PgPool;
use uuid::Uuid;

/// Fixed timestamp used across all integration tests.
pub fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// Configuration with fast retries and a short poll interval.
pub fn test_config(projection_mode: ProjectionMode) -> ProjectorConfig {
    ProjectorConfig {
        database_url: "postgres://unused".to_owned(),
        database_max_connections: 5,
        poll_interval_ms: 50,
        max_retries: 1,
        initial_backoff_ms: 0,
        max_backoff_ms: 0,
        projection_mode,
        snapshot_policy: SnapshotPolicy::Every(2),
        rebuild_on_start: false,
    }
}

/// Services over `pool` with the fixed clock.
pub fn services(pool: PgPool, projection_mode: ProjectionMode) -> Services {
    Services::with_clock(pool, &test_config(projection_mode), fixed_clock())
}

pub fn place(order_id: &str, customer_id: &str, unit_price_cents: i64) -> PlaceOrder {
    PlaceOrder {
        correlation_id: Uuid::new_v4(),
        order_id: order_id.to_owned(),
        customer_id: customer_id.to_owned(),
        lines: vec![
            OrderLine {
                sku: "sku-1".to_owned(),
                quantity: 2,
                unit_price_cents,
            },
            OrderLine {
                sku: "sku-2".to_owned(),
                quantity: 1,
                unit_price_cents: 100,
            },
        ],
        currency: "EUR".to_owned(),
    }
}

pub fn ship(order_id: &str, tracking_number: &str) -> ShipOrder {
    ShipOrder {
        correlation_id: Uuid::new_v4(),
        order_id: order_id.to_owned(),
        tracking_number: tracking_number.to_owned(),
    }
}
