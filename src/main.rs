use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn, Level};

use floodgate::config::FloodgateConfig;
use floodgate::http::RateLimitLayer;
use floodgate::ratelimit::{spawn_sweeper, PolicyEngine, RateLimitStore};

/// Brute-force protection gateway.
#[derive(Parser, Debug)]
#[command(name = "floodgate")]
#[command(about = "Rate limiting and brute-force protection for HTTP services")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address override
    #[arg(short, long)]
    listen: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut config = match args.config {
        Some(ref path) => FloodgateConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path))?,
        None => FloodgateConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }

    // Env overrides mirror the bypass config fields so QA toggles need
    // no file edit.
    if let Ok(value) = std::env::var("FLOODGATE_TEST_BYPASS") {
        config.bypass.allow_test_bypass = value == "1" || value.eq_ignore_ascii_case("true");
    }
    if let Ok(value) = std::env::var("FLOODGATE_ENV") {
        config.bypass.environment = value.parse().context("parsing FLOODGATE_ENV")?;
    }

    info!("Starting Floodgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        listen_addr = %config.server.listen_addr,
        scope = %config.policy.scope,
        origin_limit = config.policy.origin_limit,
        identity_limit = config.policy.identity_limit,
        "Configuration loaded"
    );
    if config.bypass.active() {
        warn!("rate limit bypass is ACTIVE; enforcement disabled for this process");
    }

    // The store lives for the whole process; everything else borrows it.
    let store = Arc::new(RateLimitStore::new());
    let engine = Arc::new(PolicyEngine::new(store.clone()));
    let sweeper = spawn_sweeper(
        store,
        Duration::from_secs(config.server.sweep_interval_secs),
    );

    let app = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/login",
            post(login_handler).layer(RateLimitLayer::new(
                engine,
                config.policy.clone(),
                config.bypass.clone(),
            )),
        );

    let listener = tokio::net::TcpListener::bind(config.server.listen_addr)
        .await
        .context("binding listen address")?;
    info!(addr = %config.server.listen_addr, "Floodgate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    sweeper.abort();
    info!("Floodgate stopped");
    Ok(())
}

/// Stand-in for a credential check; the layer in front of it is the
/// subject of this service.
async fn login_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "ts": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
