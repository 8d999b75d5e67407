//! Scout REST API Server
//!
//! This binary starts the Scout REST API server, exposing endpoints for
//! creating, polling and cancelling event search jobs, and optionally runs
//! the batch runner on an interval.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use scout_client::HttpSearchProvider;
use scout_core::{AliasNormalizer, JobService, ScoutConfig, load_categories_config};
use scout_db::StoreBackend;

use scout_server::{AdminToken, AppState, ServerConfig, create_router, spawn_batch_trigger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logging (RUST_LOG overrides the default level)
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command line arguments
    let config = ServerConfig::parse();

    // Open storage
    info!(store = %config.store, "Opening storage...");
    let store = StoreBackend::open(
        config.store,
        config.database_url.as_deref(),
        config.max_connections,
    )
    .await
    .context("Failed to open storage")?;
    info!("Storage ready");

    // Initialize search provider
    let provider = HttpSearchProvider::new(&config.search_endpoint, &config.search_api_key)
        .context("Failed to initialize search provider")?;

    // Load category aliases
    let categories_config = if let Some(path) = &config.categories_config {
        load_categories_config(Some(path.clone()))?
    } else {
        load_categories_config(None).unwrap_or(None)
    };

    let normalizer = match &categories_config {
        Some(cfg) => {
            info!(
                "Loaded {} categories from configuration",
                cfg.categories.len()
            );
            AliasNormalizer::with_config(cfg)
        }
        None => AliasNormalizer::builtin(),
    };

    let scout_config = ScoutConfig::from_env();
    scout_config
        .validate()
        .context("Invalid runner configuration")?;

    let job_service = JobService::new(store, provider, normalizer, scout_config);

    // Create shutdown token for graceful shutdown
    let shutdown_token = CancellationToken::new();

    // Create application state
    let admin_token = AdminToken::from_config(&config);
    if admin_token.is_none() {
        info!("SCOUT_ADMIN_TOKEN not set, batch trigger endpoint disabled");
    }
    let app_state = AppState::new(job_service, admin_token, shutdown_token.clone());

    let trigger = config
        .batch_interval_secs
        .filter(|secs| *secs > 0)
        .map(|secs| spawn_batch_trigger(app_state.clone(), Duration::from_secs(secs)));

    // Build router
    let app = create_router(app_state, &config.cors_origins);

    // Bind to address
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid address")?;

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!("Starting Scout API server on http://{}", addr);
    info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_token))
        .await
        .context("Server error")?;

    if let Some(handle) = trigger {
        handle.await.context("Batch trigger panicked")?;
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal(shutdown_token: CancellationToken) {
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");

    // Cancel the shutdown token to signal the batch runner
    shutdown_token.cancel();

    // Give the runner time to requeue its current job
    tokio::time::sleep(Duration::from_secs(2)).await;
}
