//! # tandem-server
//!
//! HTTP front end for the matching and active-conversation core.
//!
//! This binary provides:
//! - **REST API** (axum) for profiles, swipes, matches and messages
//! - **Server-sent events** for live messages, read receipts and match
//!   status changes
//! - **Per-caller rate limiting** to protect against abuse

mod api;
mod config;
mod error;
mod rate_limit;

use std::sync::Arc;
use std::time::Duration;

use tandem_core::MatchEngine;
use tandem_store::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::rate_limit::RateLimiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,tandem_server=debug,tandem_core=debug")
            }),
        )
        .init();

    info!("Starting Tandem server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the store and the engine
    // -----------------------------------------------------------------------
    let database = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    if let Some(path) = database.path() {
        info!(path = %path.display(), "Database ready");
    }
    let engine = Arc::new(MatchEngine::new(database, config.core()));

    let rate_limiter = RateLimiter::new(config.rate_limit_per_sec, config.rate_limit_burst)
        .trusting_user_header(config.trust_user_header);

    let app_state = AppState {
        engine,
        rate_limiter: rate_limiter.clone(),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic rate limiter cleanup (every 5 minutes, evict buckets idle >10 min)
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            rate_limiter.purge_stale(600.0).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
