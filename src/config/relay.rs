//! Relay configuration and defaulting.
//!
//! # Responsibilities
//! - Hold the settings that govern one relay mount point
//! - Resolve a partial configuration into a fully-defaulted one
//! - Translate buffer/limit settings into framing-layer settings
//!
//! # Design Decisions
//! - Resolution is pure and cannot fail
//! - `ResolvedConfig` can only be obtained through `resolve`, so its
//!   invariants (non-empty origins, positive buffer sizes) always hold

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use crate::relay::buffer::BufferPool;
use crate::relay::filter::Filter;

/// Origin entry that accepts every origin.
pub const WILDCARD_ORIGIN: &str = "*";

/// Buffer size used when a configured size is zero.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Settings for one relay mount point. Zero and empty values mean "use the default".
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    /// Requests for which the filter returns true bypass the relay.
    pub filter: Option<Arc<dyn Filter>>,

    /// Time allowed for the upgrade to complete. Zero disables the timeout.
    pub handshake_timeout: Duration,

    /// Subprotocols the relay accepts, in order of preference.
    pub subprotocols: Vec<String>,

    /// Allowed values of the Origin header. Empty allows everything.
    pub origins: Vec<String>,

    /// Framing-layer read buffer size in bytes.
    pub read_buffer_size: usize,

    /// Framing-layer write buffer size, also the largest chunk read from the backend.
    pub write_buffer_size: usize,

    /// Shared pool for backend read buffers. Without it each session owns its buffer.
    pub write_buffer_pool: Option<BufferPool>,

    /// Whether per-message compression may be negotiated.
    pub enable_compression: bool,

    /// Largest inbound message accepted. `None` keeps the framing-layer default.
    pub max_message_size: Option<usize>,

    /// Maximum number of concurrently live sessions. Zero means unlimited.
    pub max_sessions: usize,
}

impl RelayConfig {
    /// Apply defaults, producing a configuration the relay can run with.
    pub fn resolve(mut self) -> ResolvedConfig {
        if self.origins.is_empty() {
            self.origins = vec![WILDCARD_ORIGIN.to_string()];
        }
        if self.read_buffer_size == 0 {
            self.read_buffer_size = DEFAULT_BUFFER_SIZE;
        }
        if self.write_buffer_size == 0 {
            self.write_buffer_size = DEFAULT_BUFFER_SIZE;
        }
        ResolvedConfig(self)
    }
}

/// A fully-defaulted, immutable relay configuration.
#[derive(Debug, Clone)]
pub struct ResolvedConfig(RelayConfig);

impl ResolvedConfig {
    /// Give back the underlying configuration.
    pub fn into_config(self) -> RelayConfig {
        self.0
    }

    /// Framing-layer settings derived from the buffer sizes and read limit.
    pub fn socket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.read_buffer_size = self.0.read_buffer_size;
        config.write_buffer_size = self.0.write_buffer_size;
        if self.0.max_message_size.is_some() {
            config.max_message_size = self.0.max_message_size;
        }
        config
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        RelayConfig::default().resolve()
    }
}

impl Deref for ResolvedConfig {
    type Target = RelayConfig;

    fn deref(&self) -> &RelayConfig {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_origins_resolve_to_wildcard() {
        let resolved = RelayConfig::default().resolve();
        assert_eq!(resolved.origins, vec![WILDCARD_ORIGIN.to_string()]);
    }

    #[test]
    fn explicit_origins_are_kept() {
        let origins = vec!["https://a.test".to_string(), "https://b.test".to_string()];
        let resolved = RelayConfig {
            origins: origins.clone(),
            ..Default::default()
        }
        .resolve();
        assert_eq!(resolved.origins, origins);
    }

    #[test]
    fn zero_buffers_default_to_1024() {
        let resolved = RelayConfig::default().resolve();
        assert_eq!(resolved.read_buffer_size, 1024);
        assert_eq!(resolved.write_buffer_size, 1024);
    }

    #[test]
    fn positive_buffers_pass_through() {
        let resolved = RelayConfig {
            read_buffer_size: 4096,
            write_buffer_size: 17,
            ..Default::default()
        }
        .resolve();
        assert_eq!(resolved.read_buffer_size, 4096);
        assert_eq!(resolved.write_buffer_size, 17);
    }

    #[test]
    fn resolution_is_idempotent() {
        let once = RelayConfig {
            handshake_timeout: Duration::from_secs(3),
            subprotocols: vec!["mqtt".into()],
            origins: vec!["https://a.test".into()],
            enable_compression: true,
            max_message_size: Some(1 << 20),
            max_sessions: 8,
            ..Default::default()
        }
        .resolve();
        let twice = once.clone().into_config().resolve();

        assert_eq!(once.origins, twice.origins);
        assert_eq!(once.subprotocols, twice.subprotocols);
        assert_eq!(once.read_buffer_size, twice.read_buffer_size);
        assert_eq!(once.write_buffer_size, twice.write_buffer_size);
        assert_eq!(once.handshake_timeout, twice.handshake_timeout);
        assert_eq!(once.enable_compression, twice.enable_compression);
        assert_eq!(once.max_message_size, twice.max_message_size);
        assert_eq!(once.max_sessions, twice.max_sessions);
    }

    #[test]
    fn socket_config_carries_buffer_sizes() {
        let resolved = RelayConfig {
            read_buffer_size: 2048,
            max_message_size: Some(64 * 1024),
            ..Default::default()
        }
        .resolve();
        let socket = resolved.socket_config();
        assert_eq!(socket.read_buffer_size, 2048);
        assert_eq!(socket.write_buffer_size, 1024);
        assert_eq!(socket.max_message_size, Some(64 * 1024));
    }
}
