//! # Agora Server
//!
//! Broadcast chatroom over WebSocket.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (ws://0.0.0.0:9000/chat)
//! agora
//!
//! # Run with a custom config
//! AGORA_CONFIG=/path/to/agora.toml agora
//!
//! # Run with environment variables
//! AGORA_PORT=9000 AGORA_HOST=127.0.0.1 agora
//! ```
//!
//! Clients join with `ws://host:port/chat?username=alice`.

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,agora_core=debug,agora_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Agora server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
