//! Chronicle projector daemon error types.

use chronicle_core::error::DomainError;
use chronicle_core::projection::ProjectionError;
use thiserror::Error;

/// Startup and runtime errors for the projector daemon.
#[derive(Debug, Error)]
pub enum AppError {
    /// A configuration value is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The schema migrations could not be applied.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Signal handling or other I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A projection could not be advanced.
    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),

    /// A store or domain operation failed.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
}

impl AppError {
    /// Process exit code reported for this error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Database(_) | Self::Migration(_) => 3,
            Self::Io(_) | Self::Projection(_) | Self::Domain(_) => 1,
        }
    }
}
