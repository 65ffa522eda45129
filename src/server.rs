//! Process wiring: builds the services from configuration and runs them.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::http::{self, AppState, RouterSettings};
use crate::metrics;
use crate::reliability::RateLimiter;
use crate::services::{ContentStore, ExpiryReaper, Ingestor, Resolver, SweepReport};

/// Run the HTTP server until Ctrl-C or SIGTERM.
///
/// Opens the record store, creates the upload directory, starts the expiry
/// reaper and limiter eviction, then serves until a shutdown signal. Both
/// background tasks are stopped before returning.
///
/// # Errors
///
/// Returns an error if the store, upload directory or listener cannot be set
/// up, or if the server fails.
pub async fn run(config: &Config) -> Result<()> {
    if let Err(e) = metrics::init_metrics() {
        warn!(error = %e, "Metrics exporter unavailable");
    }

    let store = ContentStore::sqlite(&config.storage.database_url)
        .with_context(|| format!("Failed to open store '{}'", config.storage.database_url))?;

    let ingest = config.ingest();
    tokio::fs::create_dir_all(&ingest.upload_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create upload directory {}",
                ingest.upload_dir.display()
            )
        })?;

    let limiter = Arc::new(RateLimiter::new(config.rate_limit()));
    let state = Arc::new(AppState {
        ingestor: Ingestor::new(store.clone(), ingest),
        resolver: Resolver::new(store.clone()),
        limiter: Arc::clone(&limiter),
        public_url: config.public_url(),
    });
    let settings = RouterSettings {
        body_limit: config.body_limit(),
        request_timeout: config.request_timeout(),
        allowed_origins: config.server.allowed_origins.clone(),
    };

    let shutdown = CancellationToken::new();
    let eviction = limiter.spawn_eviction(&shutdown);
    let reaper = ExpiryReaper::new(store, config.sweep_interval()).start(&shutdown);

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(
        address = %addr,
        public_url = %config.public_url(),
        upload_dir = %config.storage.upload_dir.display(),
        "Server listening"
    );

    let result = http::serve(listener, http::router(state, &settings), shutdown_signal()).await;

    shutdown.cancel();
    eviction.stop().await;
    reaper.stop().await;
    info!("Shutdown complete");

    result
}

/// Run a single expiry sweep against the configured store.
///
/// # Errors
///
/// Returns an error if the store cannot be opened.
pub async fn sweep_once(config: &Config) -> Result<SweepReport> {
    let store = ContentStore::sqlite(&config.storage.database_url)
        .with_context(|| format!("Failed to open store '{}'", config.storage.database_url))?;
    Ok(ExpiryReaper::new(store, config.sweep_interval())
        .run_once()
        .await)
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, stopping server...");
}
