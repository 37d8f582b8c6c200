/// ISS pass tracker entry point
mod clients;
mod config;
mod domain;
mod errors;
mod handlers;
mod metrics;
mod orbit;
mod predictor;
mod repo;
mod routes;
mod services;
mod simulation;
mod utils;

use crate::clients::{ElementsClient, TelemetryClient};
use crate::config::AppConfig;
use crate::handlers::AppState;
use crate::routes::build_router;
use crate::services::TrackerService;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    // Load configuration
    let config = Arc::new(AppConfig::from_env()?);
    info!("Configuration loaded successfully");

    // Initialize clients
    let telemetry_client = TelemetryClient::new(config.telemetry_url.clone())?;
    let elements_client = ElementsClient::new(config.tle_sources.clone())?;

    // Initialize tracker and its background tasks
    let tracker = Arc::new(TrackerService::new(
        config.clone(),
        telemetry_client,
        elements_client,
    ));
    tracker.start_background_tasks().await;

    let state = AppState {
        tracker: tracker.clone(),
    };
    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.bind_addr.as_str()).await?;
    info!("iss_pass_tracker listening on {}", config.bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracker.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
