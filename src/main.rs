//! OpenLARQ - REST gateway for LARQ hydration data.
//!
//! Logs in, opens the realtime database socket, and serves the REST routes
//! until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use openlarq::api::{self, AppState, CustomerApi};
use openlarq::auth;
use openlarq::cache::ResponseCache;
use openlarq::config::Config;
use openlarq::realtime::{endpoint_url, RealtimeClient, WebSocketConnector};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "openlarq=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    tracing::info!("Starting OpenLARQ gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::parse();
    let http = reqwest::Client::new();

    let credential = auth::login(&http, &config.login())
        .await
        .context("Failed to log in")?;

    let url = endpoint_url(&config.database_url, &config.project_id)
        .context("Invalid realtime database URL")?;
    tracing::info!(url = %url, "Connecting to realtime database");

    let realtime = RealtimeClient::connect(config.client(), WebSocketConnector::new(url))
        .await
        .context("Failed to connect to realtime database")?;
    realtime
        .authenticate_user(&credential)
        .await
        .context("Failed to authenticate realtime session")?;

    let customer = CustomerApi::new(http, config.customer_api_base.clone(), config.email.clone());
    let cache = ResponseCache::with_capacity(config.cache_ttl(), config.cache_max_entries);
    let state = AppState::new(realtime.clone(), cache, customer);
    let app = api::router(state);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr = %addr, "Listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");

    realtime.close().await;
    tracing::info!("OpenLARQ gateway exited cleanly");
    result
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        // Keep serving.
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
