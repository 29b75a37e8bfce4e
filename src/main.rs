//! forge-proxy
//!
//! Long-running bridge between a browser and the upstream generative 3D API.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                  FORGE PROXY                  │
//!     Browser            │                                               │
//!     ───────────────────┼─▶ /api/download ──▶ download relay ───────────┼──▶ Artifact storage
//!                        │                                               │
//!     ───────────────────┼─▶ /api/task/watch ─▶ WebSocket relay ─────────┼──▶ Upstream WS
//!                        │                         (+ credential)        │
//!     ───────────────────┼─▶ /api/<rest> ──────▶ reverse proxy ──────────┼──▶ Upstream /openapi
//!                        │                         (+ credential)        │
//!                        │                                               │
//!                        │  config · logging · metrics · shutdown         │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use forge_proxy::config::load_startup_config;
use forge_proxy::observability::{logging, metrics};
use forge_proxy::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "forge-proxy")]
#[command(about = "Credential-hiding proxy for a generative 3D API", long_about = None)]
struct Args {
    /// Optional TOML config file.
    #[arg(short, long, env = "FORGE_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is normal in production.
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let mut config = load_startup_config(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability);
    tracing::info!("forge-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        credential_configured = config.upstream.api_key.is_some(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
