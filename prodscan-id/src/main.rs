//! prodscan-id - Product Identification Service
//!
//! Accepts a photo on `POST /upload`, splits it into detected object regions
//! and streams one NDJSON event per region as each is identified.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use prodscan_common::config::{ConfigResolver, ConfigSource};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use prodscan_id::config::resolve_api_keys;
use prodscan_id::pipeline::{Oracles, Pipeline};
use prodscan_id::services::{OpenAIClient, OpenFoodFactsClient, RasterCodec, VisionClient};
use prodscan_id::AppState;

/// Command-line arguments for prodscan-id
#[derive(Parser, Debug)]
#[command(name = "prodscan-id")]
#[command(about = "Multi-region product identification service")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind (overrides config)
    #[arg(short, long, env = "PRODSCAN_BIND")]
    bind: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "PRODSCAN_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = ConfigResolver::new("prodscan-id");
    let (config, source) = resolver
        .load(args.config.as_deref())
        .context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting prodscan-id v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match &source {
        ConfigSource::File(path) => info!("Config: {}", path.display()),
        ConfigSource::Defaults { missing: Some(path) } => {
            warn!("Config file {} not found, using defaults", path.display())
        }
        ConfigSource::Defaults { missing: None } => info!("Config: compiled defaults"),
    }

    let keys = resolve_api_keys(&config).context("Failed to resolve API keys")?;

    let oracles = Oracles {
        annotation: Arc::new(
            VisionClient::new(&config.vision, keys.vision)
                .context("Failed to build Vision client")?,
        ),
        terms: Arc::new(
            OpenAIClient::new(&config.term_oracle, keys.term_oracle)
                .context("Failed to build OpenAI client")?,
        ),
        catalog: Arc::new(
            OpenFoodFactsClient::new(&config.catalog)
                .context("Failed to build OpenFoodFacts client")?,
        ),
        codec: Arc::new(RasterCodec::new()),
    };

    info!(
        target_language = %config.term_oracle.target_language,
        region_concurrency = config.pipeline.region_concurrency,
        "Pipeline ready"
    );
    let pipeline = Pipeline::new(
        oracles,
        config.pipeline.clone(),
        config.term_oracle.target_language.clone(),
    );

    let state = AppState::new(pipeline, config.server.max_upload_bytes);
    let app = prodscan_id::build_router(state);

    let bind = args.bind.unwrap_or(config.server.bind_address);
    let port = args.port.unwrap_or(config.server.port);
    let addr = format!("{}:{}", bind, port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
