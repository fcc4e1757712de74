//! ws-relay
//!
//! Accepts WebSocket upgrades and relays each session to a plain TCP backend.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌────────────────────────────────────────────┐
//!                        │                  WS RELAY                  │
//!     Client (WebSocket) │  ┌────────┐   ┌─────────┐   ┌──────────┐   │
//!     ───────────────────┼─▶│  http  │──▶│  relay  │──▶│  dialer  │───┼──▶ Backend (TCP)
//!                        │  │ server │   │  gate   │   └────┬─────┘   │
//!                        │  └────────┘   └─────────┘        ▼         │
//!     ◀──────────────────┼──────────── frames ◀──────── bridge ◀──────┼─── raw bytes
//!                        │                                            │
//!                        │  config · lifecycle · observability · net  │
//!                        └────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use ws_relay::config::loader::load_config;
use ws_relay::config::{ConfigOverrides, ServerConfig};
use ws_relay::lifecycle::startup;
use ws_relay::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "ws-relay", version, about = "Relay WebSocket sessions to a TCP backend")]
struct Cli {
    /// Path to a TOML config file. Watched for changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(long)]
    bind: Option<String>,

    /// Override the backend address.
    #[arg(long)]
    backend: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    let overrides = ConfigOverrides {
        bind_address: cli.bind,
        backend_address: cli.backend,
    };
    overrides.apply(&mut config);

    logging::init(&config.observability.log_filter);
    tracing::info!("ws-relay v{} starting", env!("CARGO_PKG_VERSION"));

    startup::run(config, cli.config, overrides).await
}
