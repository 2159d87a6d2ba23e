//! Lookerdrop Web Server - Looker webhook receiver.
//!
//! This binary:
//! - Reads settings from the environment
//! - Fetches the dashboard config from object storage (fatal on failure)
//! - Serves `POST /` for Looker deliveries and `GET /health`

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lookerdrop::{router, AppState, DashboardConfig, Settings, StorageClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let settings = Settings::from_env().context("Invalid environment configuration")?;
    info!(
        port = settings.port,
        config_location = %settings.config_location,
        storage_backend = ?settings.storage,
        instance_header = %settings.credentials.instance_header,
        token_header = %settings.credentials.token_header,
        max_body_bytes = settings.max_body_bytes,
        max_archive_entries = settings.max_archive_entries,
        max_archive_bytes = settings.max_archive_bytes,
        "settings_loaded"
    );

    let storage = StorageClient::new(&settings.storage);

    let dashboards = DashboardConfig::load(
        &storage,
        &settings.config_location,
        settings.config_fetch_timeout,
    )
    .await
    .with_context(|| format!("Could not load dashboard config {}", settings.config_location))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));

    // Create application state
    let state = AppState::new(settings, dashboards, storage);

    let app = router(state);

    // Bind to address
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
