//! # safewatch-server
//!
//! Front-end for the SafeWatch presence hub.
//!
//! This binary provides:
//! - **REST API** (axum) for registration, emergency contacts, tracking
//!   sessions and emergency alerts
//! - **WebSocket presence channel** where clients authenticate, check in and
//!   receive pushed events from their contacts
//! - **Per-IP rate limiting** on the HTTP API

mod api;
mod config;
mod error;
mod publisher;
mod rate_limit;
mod ws;

use safewatch_shared::constants::APP_NAME;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,safewatch_server=debug,safewatch_hub=debug")
        }))
        .init();

    info!("Starting {} hub v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        instance = %config.instance_name,
        http_addr = %config.http_addr,
        connection_buffer = config.connection_buffer,
        admin_enabled = config.admin_token.is_some(),
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize the hub and shared state
    // -----------------------------------------------------------------------
    let http_addr = config.http_addr;
    let app_state = AppState::new(config);

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Rate limiter cleanup (every 5 minutes, evict buckets idle >10 min)
    let rl = app_state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            rl.purge_idle(600.0).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP + WebSocket server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
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
