//! # Catalog API
//!
//! Serves the read API until Ctrl+C or SIGTERM.

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use catalog_core::bootstrap::ApiBootstrap;
use catalog_core::config::ConfigLoader;
use catalog_core::logging;
use catalog_core::web::create_app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::load().context("failed to load configuration")?;
    logging::init_structured_logging(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %logging::get_environment(),
        bind_address = %config.web.bind_address,
        "Starting catalog API"
    );

    let state = ApiBootstrap::bootstrap(&config)
        .await
        .context("failed to bootstrap read API")?;
    let app = create_app(state);

    let listener = TcpListener::bind(&config.web.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.web.bind_address))?;

    info!(address = %config.web.bind_address, "Catalog API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Catalog API stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
