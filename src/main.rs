use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use soul_observer::{
    analyzer::Analyzer,
    config::Config,
    provider::ProviderClient,
    routes::{app, AppState},
};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env().context("invalid configuration")?;
    config.require_api_key().context("refusing to start")?;
    tracing::info!(
        "Upstream {} model {} (json_mode={}, timeout={}s, max_images={})",
        config.api_base,
        config.model,
        config.json_mode,
        config.timeout.as_secs(),
        config.max_images
    );

    let provider = ProviderClient::new(&config)?;
    let state = AppState { analyzer: Arc::new(Analyzer::new(Arc::new(provider), &config)) };
    let router = app(state, config.max_body_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
