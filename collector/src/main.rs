//! Telemetry Collector - development server
//!
//! Receives event batches from telemetry agents and keeps them in memory.

use anyhow::Context;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use telemetry_collector::{config::Config, CollectorState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "telemetry_collector=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    tracing::info!("Telemetry Collector starting...");

    let state = CollectorState::new();
    state.set_reject(config.reject);
    if config.reject {
        tracing::warn!("Reject mode enabled: every batch will be answered with 503");
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid COLLECTOR_HOST/COLLECTOR_PORT")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("🚀 Collector listening on http://{}", addr);

    axum::serve(listener, telemetry_collector::router(state))
        .await
        .context("Server error")?;

    Ok(())
}
