//! Peerlink Node - rendezvous broker for direct peer connections.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use peerlink_broker::Broker;
use peerlink_node::api::{create_router, AppState};
use peerlink_node::config::Config;
use peerlink_node::observability::{init_logging, LogFormat};

/// Peerlink Node - rendezvous broker for direct peer connections
#[derive(Parser, Debug)]
#[command(name = "peerlink-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP and WebSocket listen address
    #[arg(long)]
    listen_addr: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (mut config, missing_file) = match &args.config {
        Some(path) if path.exists() => (
            Config::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None,
        ),
        Some(path) => (Config::default(), Some(path.clone())),
        None => (Config::default(), None),
    };

    if let Some(addr) = args.listen_addr {
        config.listen_addr = addr;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    if let Some(format) = args.log_format.as_deref() {
        config.log_format = LogFormat::parse(format);
    }
    config.validate()?;

    init_logging(&config.log_level, config.log_format);
    if let Some(path) = missing_file {
        tracing::warn!(path = %path.display(), "Config file not found, using defaults");
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting peerlink node");
    tracing::info!(
        listen_addr = %config.listen_addr,
        max_connections = config.max_connections,
        ping_interval_secs = config.ping_interval_secs,
        "Node configuration"
    );

    let state = AppState::new(Arc::new(Broker::default()), &config);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
