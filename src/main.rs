//! Application entry point and server initialization
//!
//! This module contains the main function that:
//! - Loads environment configuration
//! - Initializes the database and the API key pool
//! - Starts the periodic fetch job
//! - Starts the HTTP server with graceful shutdown support

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vidfetch::config::Config;
use vidfetch::database::init_db;
use vidfetch::fetcher::Fetcher;
use vidfetch::rotator::CredentialRotator;
use vidfetch::route::create_app;
use vidfetch::state::AppState;
use vidfetch::youtube::YouTubeClient;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file if it exists
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vidfetch=debug,tower_http=debug")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "fatal error");
            ExitCode::FAILURE
        }
    }
}

/// Wires the service together and serves until a shutdown signal
///
/// This function:
/// 1. Reads the configuration from the environment
/// 2. Opens the database and builds the API key pool and search client
/// 3. Starts the background fetch job, unless disabled
/// 4. Serves HTTP until SIGINT or SIGTERM, then stops the job
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Read and validate every setting up front
    let config = Arc::new(Config::from_env()?);

    // Initialize the store and the fetch pipeline sharing it
    let db = Arc::new(init_db(&config.database_path)?);
    let rotator = Arc::new(CredentialRotator::new(config.api_keys.clone(), config.quota)?);
    let search = Arc::new(YouTubeClient::new(config.api_base_url.clone(), SEARCH_TIMEOUT)?);
    let fetcher = Fetcher::new(rotator.clone(), search, db.clone());

    info!(keys = rotator.len(), database = %config.database_path, "initialized");

    // Periodic fetch across the configured keywords
    let schedule = config.fetch_interval.map(|period| {
        let job_config = config.clone();
        info!(minutes = period.as_secs() / 60, "scheduling background fetch");
        fetcher.clone().spawn_schedule(
            config.fetch_keywords.clone(),
            period,
            config.default_fetch_limit,
            move || job_config.default_published_after(Utc::now()),
        )
    });

    let state = AppState {
        db,
        fetcher,
        config: config.clone(),
    };
    // Create the Axum router with all routes configured
    let app = create_app(state).layer(TraceLayer::new_for_http());

    // Bind to all network interfaces on the configured port
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "server running");

    // Serve until SIGINT or SIGTERM, letting open connections finish
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the background job once the server has drained
    if let Some(handle) = schedule {
        handle.abort();
    }
    Ok(())
}

/// Resolves on SIGINT, or on SIGTERM on Unix systems
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
