//! # Catalog Processor
//!
//! Runs the ingestion consumer pool until Ctrl+C or SIGTERM.
//!
//! ```bash
//! CATALOG__QUEUE__PROVIDER=pgmq CATALOG__CONSUMER__WORKER_COUNT=8 \
//!     cargo run --bin catalog-processor
//! ```

use anyhow::Context;
use tokio::signal;
use tracing::info;

use catalog_core::bootstrap::ProcessorBootstrap;
use catalog_core::config::ConfigLoader;
use catalog_core::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::load().context("failed to load configuration")?;
    logging::init_structured_logging(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %logging::get_environment(),
        queue = %config.queue.queue_name,
        workers = config.consumer.worker_count,
        "Starting catalog processor"
    );
    info!(config = ?config.sanitized(), "Effective configuration");

    let handle = ProcessorBootstrap::bootstrap(&config)
        .await
        .context("failed to bootstrap processor")?;

    shutdown_signal().await?;
    info!("Shutdown signal received, draining workers");

    let stats = handle.stats();
    handle.shutdown().await;
    info!(stats = ?stats, "Catalog processor stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;
        tokio::select! {
            result = signal::ctrl_c() => result.context("failed to listen for Ctrl+C")?,
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    Ok(())
}
