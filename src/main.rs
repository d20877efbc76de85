mod api;
mod clock;
mod config;
mod context;
mod cors;
mod error;
mod gateway;
mod metrics;
mod middleware;
mod ratelimit;
mod relay;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::{
    api::AppState,
    clock::MonotonicClock,
    config::{GatewayConfig, LogFormat},
    gateway::Gateway,
    metrics::MetricsRegistry,
    ratelimit::{RateLimiter, in_memory::InMemoryWindowStore, spawn_sweeper},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cfg = GatewayConfig::from_env().context("failed to build gateway config")?;
    init_tracing(cfg.log_format);

    let policy = cfg.rate_limit.policy();
    let limiter = RateLimiter::new(
        Arc::new(InMemoryWindowStore::new(policy)),
        Arc::new(MonotonicClock),
    );
    if let Some(every) = cfg.rate_limit.sweep_interval() {
        spawn_sweeper(limiter.clone(), every);
    }

    let metrics = Arc::new(MetricsRegistry::new());
    let gateway = Gateway::from_config(&cfg, limiter.clone(), metrics.clone())
        .context("failed to build gateway")?;

    if cfg.relay.api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY is not set; /api/parse will answer 500");
    }
    tracing::warn!(
        "client keys trust X-Forwarded-For; run behind a proxy that overwrites it"
    );

    let app = api::routes(AppState::new(Arc::new(gateway), limiter, metrics));

    let listener = TcpListener::bind(cfg.bind_addr)
        .await
        .context("failed to bind listener")?;

    tracing::info!(
        addr = %cfg.bind_addr,
        limit = policy.limit,
        window_seconds = policy.window_seconds(),
        "document parse gateway listening"
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}
