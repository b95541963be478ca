//! Wiring of the `PostgreSQL` stores into a runner and a repository.

use std::sync::Arc;

use chronicle_core::clock::{Clock, SystemClock};
use chronicle_core::projection::{ProjectionMode, ProjectionRunner};
use chronicle_core::repository::Repository;
use chronicle_event_store::pg_cursor_store::PgCursorStore;
use chronicle_event_store::pg_event_store::PgEventStore;
use chronicle_event_store::pg_snapshot_store::PgSnapshotStore;
use chronicle_event_store::schema::MIGRATOR;
use chronicle_orders::application::projector::OrderSummaryProjector;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::ProjectorConfig;
use crate::error::AppError;
use crate::pg_order_summary_store::PgOrderSummaryStore;

/// Opens the pool and brings the schema up to date.
///
/// # Errors
///
/// Returns `AppError::Database` if no connection can be made and
/// `AppError::Migration` if a migration fails.
pub async fn connect(config: &ProjectorConfig) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    MIGRATOR.run(&pool).await?;
    info!("schema migrations applied");
    Ok(pool)
}

/// Stores, runner and repository sharing one pool.
#[derive(Clone)]
pub struct Services {
    /// `PostgreSQL` connection pool.
    pub pool: PgPool,
    /// Order-summary read model.
    pub summaries: Arc<PgOrderSummaryStore>,
    /// Runner of the order-summary projector.
    pub runner: Arc<ProjectionRunner>,
    /// Command-side repository.
    pub repository: Repository,
}

impl Services {
    /// Builds the services stamping events with the system clock.
    #[must_use]
    pub fn new(pool: PgPool, config: &ProjectorConfig) -> Self {
        Self::with_clock(pool, config, Arc::new(SystemClock))
    }

    /// Builds the services stamping events with `clock`.
    #[must_use]
    pub fn with_clock(pool: PgPool, config: &ProjectorConfig, clock: Arc<dyn Clock>) -> Self {
        let events = Arc::new(PgEventStore::with_clock(pool.clone(), Arc::clone(&clock)));
        let snapshots = Arc::new(PgSnapshotStore::new(pool.clone()));
        let cursors = Arc::new(PgCursorStore::new(pool.clone()));
        let summaries = Arc::new(PgOrderSummaryStore::new(pool.clone()));

        let runner = Arc::new(
            ProjectionRunner::new(
                Arc::new(OrderSummaryProjector::new(summaries.clone())),
                events.clone(),
                cursors,
            )
            .with_retry_policy(config.retry_policy())
            .with_poll_interval(config.poll_interval()),
        );

        let mut repository =
            Repository::new(events, snapshots, clock).with_snapshot_policy(config.snapshot_policy);
        if config.projection_mode == ProjectionMode::Synchronous {
            repository = repository.with_synchronous_projection(Arc::clone(&runner));
        }

        Self {
            pool,
            summaries,
            runner,
            repository,
        }
    }

    /// Brings the read model current, by a full rebuild if configured,
    /// then follows the store until `shutdown` flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Projection` if the initial pass or the append
    /// subscription fails.
    pub async fn run(
        &self,
        config: &ProjectorConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), AppError> {
        let report = if config.rebuild_on_start {
            self.runner.rebuild().await?
        } else {
            self.runner.catch_up().await?
        };
        for (stream, reason) in &report.failed {
            warn!(%stream, %reason, "stream did not catch up on start");
        }
        info!(
            processed = report.processed,
            rebuilt = config.rebuild_on_start,
            "initial projection pass finished"
        );

        self.runner.run(shutdown).await?;
        Ok(())
    }
}
