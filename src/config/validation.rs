//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, the relay path and header-bound values
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ServerConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Listener bind address is not a socket address.
    InvalidBindAddress(String),
    /// Relay path does not start with '/'.
    InvalidPath(String),
    /// Backend address is not of the form host:port.
    InvalidBackendAddress(String),
    /// An origin entry is empty or not a valid header value.
    InvalidOrigin(String),
    /// A subprotocol is not a valid token.
    InvalidSubprotocol(String),
    /// A size limit that must be positive is zero.
    ZeroLimit(&'static str),
    /// Metrics address is not a socket address.
    InvalidMetricsAddress(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidBindAddress(a) => write!(f, "invalid bind address '{}'", a),
            ValidationError::InvalidPath(p) => write!(f, "relay path '{}' must start with '/'", p),
            ValidationError::InvalidBackendAddress(a) => {
                write!(f, "invalid backend address '{}', expected host:port", a)
            }
            ValidationError::InvalidOrigin(o) => write!(f, "invalid origin '{}'", o),
            ValidationError::InvalidSubprotocol(p) => write!(f, "invalid subprotocol '{}'", p),
            ValidationError::ZeroLimit(name) => write!(f, "{} must be greater than zero", name),
            ValidationError::InvalidMetricsAddress(a) => write!(f, "invalid metrics address '{}'", a),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Paths served by the host itself.
pub const RESERVED_PATHS: [&str; 3] = ["/health", "/status", "/sessions"];

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.listener.bind_address.clone()));
    }
    if !config.listener.path.starts_with('/') || RESERVED_PATHS.contains(&config.listener.path.as_str()) {
        errors.push(ValidationError::InvalidPath(config.listener.path.clone()));
    }
    if !is_host_port(&config.backend.address) {
        errors.push(ValidationError::InvalidBackendAddress(config.backend.address.clone()));
    }

    for origin in &config.relay.origins {
        if origin.is_empty() || origin.bytes().any(|b| b.is_ascii_control()) {
            errors.push(ValidationError::InvalidOrigin(origin.clone()));
        }
    }
    for protocol in &config.relay.subprotocols {
        if !is_token(protocol) {
            errors.push(ValidationError::InvalidSubprotocol(protocol.clone()));
        }
    }
    if config.relay.max_message_size == Some(0) {
        errors.push(ValidationError::ZeroLimit("max_message_size"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_host_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

// RFC 7230 token characters.
fn is_token(value: &str) -> bool {
    !value.is_empty()
        && value.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}
