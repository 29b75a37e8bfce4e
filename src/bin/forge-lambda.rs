//! Serverless entry point.
//!
//! Reads one function event as JSON on stdin and writes the response JSON on
//! stdout. Logs go to stderr.

use std::path::PathBuf;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use forge_proxy::config::load_startup_config;
use forge_proxy::observability::logging;
use forge_proxy::serverless::{ServerlessEvent, ServerlessHandler};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    let config_path = std::env::var_os("FORGE_PROXY_CONFIG").map(PathBuf::from);
    let config = load_startup_config(config_path.as_deref())?;
    logging::init(&config.observability);

    let mut raw = String::new();
    tokio::io::stdin().read_to_string(&mut raw).await?;
    let event: ServerlessEvent = serde_json::from_str(&raw)?;

    let handler = ServerlessHandler::new(&config)?;
    let response = handler.handle(event).await;
    tracing::info!(status = response.status_code, "Invocation complete");

    let mut stdout = tokio::io::stdout();
    stdout.write_all(serde_json::to_string(&response)?.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
