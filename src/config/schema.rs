//! Configuration schema definitions.
//!
//! This module defines the on-disk configuration structure for the relay
//! server. All types derive Serde traits for deserialization from config files.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::relay::RelayConfig;
use crate::relay::buffer::BufferPool;
use crate::relay::filter::{AnyFilter, Filter, NonUpgradeFilter, PathPrefixFilter};

/// Root configuration for the relay server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, relay path).
    pub listener: ListenerConfig,

    /// Backend the relay dials for every session.
    pub backend: BackendConfig,

    /// Relay behaviour (origins, buffers, subprotocols).
    pub relay: RelaySettings,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Route the relay is mounted on. May contain `{param}` captures.
    pub path: String,

    /// Seconds to wait for live sessions after shutdown is requested.
    pub drain_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            path: "/ws".to_string(),
            drain_timeout_secs: 10,
        }
    }
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend address (e.g., "127.0.0.1:4222").
    pub address: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:4222".to_string(),
        }
    }
}

/// Relay settings as written in the config file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelaySettings {
    /// Upgrade timeout in milliseconds (0 = none).
    pub handshake_timeout_ms: u64,

    /// Accepted subprotocols, most preferred first.
    pub subprotocols: Vec<String>,

    /// Allowed origins. Empty allows all.
    pub origins: Vec<String>,

    /// Read buffer size in bytes (0 = default).
    pub read_buffer_size: usize,

    /// Write buffer size in bytes (0 = default).
    pub write_buffer_size: usize,

    /// Number of backend read buffers kept in a shared pool (0 = no pool).
    pub buffer_pool_size: usize,

    /// Attempt per-message compression negotiation.
    pub enable_compression: bool,

    /// Largest inbound message in bytes.
    pub max_message_size: Option<usize>,

    /// Maximum concurrent sessions (0 = unlimited).
    pub max_sessions: usize,

    /// Let requests that are not upgrade requests fall through to the next handler.
    pub skip_non_upgrade: bool,

    /// Path prefixes that fall through to the next handler.
    pub skip_path_prefixes: Vec<String>,
}

impl RelaySettings {
    /// Build the relay configuration described by these settings.
    pub fn to_relay_config(&self) -> RelayConfig {
        let mut filters: Vec<Arc<dyn Filter>> = Vec::new();
        if self.skip_non_upgrade {
            filters.push(Arc::new(NonUpgradeFilter));
        }
        for prefix in &self.skip_path_prefixes {
            filters.push(Arc::new(PathPrefixFilter::new(prefix.clone())));
        }
        let filter: Option<Arc<dyn Filter>> = match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Arc::new(AnyFilter::new(filters))),
        };

        let write_buffer_pool = (self.buffer_pool_size > 0).then(|| {
            let buffer_size = if self.write_buffer_size == 0 {
                crate::config::relay::DEFAULT_BUFFER_SIZE
            } else {
                self.write_buffer_size
            };
            BufferPool::new(buffer_size, self.buffer_pool_size)
        });

        RelayConfig {
            filter,
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            subprotocols: self.subprotocols.clone(),
            origins: self.origins.clone(),
            read_buffer_size: self.read_buffer_size,
            write_buffer_size: self.write_buffer_size,
            write_buffer_pool,
            enable_compression: self.enable_compression,
            max_message_size: self.max_message_size,
            max_sessions: self.max_sessions,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when RUST_LOG is unset.
    pub log_filter: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "ws_relay=debug,tower_http=debug".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Command-line values that take precedence over the config file,
/// including on every hot reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub bind_address: Option<String>,
    pub backend_address: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(bind) = &self.bind_address {
            config.listener.bind_address = bind.clone();
        }
        if let Some(backend) = &self.backend_address {
            config.backend.address = backend.clone();
        }
    }
}
