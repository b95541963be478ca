//! Chronicle projector daemon entry point.

use std::process::ExitCode;

use chronicle_projector::config::ProjectorConfig;
use chronicle_projector::error::AppError;
use chronicle_projector::services::{Services, connect};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "projector daemon failed");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), AppError> {
    tracing::info!("Starting Chronicle projector daemon");

    let config = ProjectorConfig::from_env()?;
    let pool = connect(&config).await?;
    let services = Services::new(pool, &config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(e) => tracing::warn!(error = %e, "cannot listen for ctrl-c; stopping"),
        }
        let _ = shutdown_tx.send(true);
    });

    services.run(&config, shutdown_rx).await?;
    services.pool.close().await;
    tracing::info!("Chronicle projector daemon stopped");
    Ok(())
}
