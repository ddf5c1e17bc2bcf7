mod analysis;
mod config;
mod errors;
mod extract;
mod features;
mod llm_client;
mod rate_limit;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::gemini::GeminiTransport;
use crate::llm_client::ModelInvoker;
use crate::rate_limit::FixedWindowLimiter;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CV Lens API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize model transport and fallback invoker
    let transport = GeminiTransport::new(
        config.gemini_api_key.clone(),
        config.gemini_api_base.clone(),
    )?;
    let policy = config.invocation_policy();
    info!(
        backends = ?policy.backends,
        timeout_secs = policy.per_call_timeout.as_secs(),
        worst_case_secs = policy.worst_case_duration().as_secs(),
        "Model invoker initialized"
    );
    let invoker = ModelInvoker::new(Arc::new(transport), policy);

    let rate_limiter = Arc::new(FixedWindowLimiter::per_minute(config.rate_limit_per_minute));
    info!("Rate limit: {} requests/minute per caller", config.rate_limit_per_minute);

    // Build app state
    let state = AppState {
        config: config.clone(),
        invoker,
        rate_limiter,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to the web front end's host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    info!("Shutdown signal received, draining connections");
}
