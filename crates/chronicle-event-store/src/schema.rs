//! Event store database schema.

use sqlx::migrate::Migrator;

/// Migrations creating the event, snapshot, cursor and read-model tables.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// `LISTEN`/`NOTIFY` channel carrying the stream of each committed append.
pub const NOTIFY_CHANNEL: &str = "chronicle_events";
