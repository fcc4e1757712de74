//! Startup orchestration.
//!
//! # Design Decisions
//! - Fail fast: an invalid config or unbindable address is fatal
//! - A metrics exporter that fails to start is logged, not fatal
//! - Listener starts last (traffic only when ready)

use std::path::PathBuf;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::validation::validate_config;
use crate::config::watcher::ConfigWatcher;
use crate::config::{ConfigOverrides, ServerConfig};
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;

/// Run the relay with `config` until a shutdown signal arrives.
///
/// With `config_path`, the file is watched and relay settings are reloaded on change.
/// `overrides` were already applied to `config` and are applied again to every reload.
pub async fn run(
    config: ServerConfig,
    config_path: Option<PathBuf>,
    overrides: ConfigOverrides,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(errors) = validate_config(&config) {
        for e in &errors {
            tracing::error!(error = %e, "Invalid configuration");
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        path = %config.listener.path,
        backend = %config.backend.address,
        max_sessions = config.relay.max_sessions,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher alive for the lifetime of the server.
    let (_watcher, config_updates) = match config_path {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(&path);
            match watcher.run() {
                Ok(handle) => (Some(handle), rx),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload disabled");
                    (None, rx)
                }
            }
        }
        None => (None, mpsc::unbounded_channel().1),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config).with_overrides(overrides);
    server.run(listener, config_updates, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
