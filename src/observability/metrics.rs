//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_sessions_active` (gauge): sessions between upgrade and teardown
//! - `relay_sessions_total` (counter): sessions ever started
//! - `relay_handshake_rejections_total` (counter): rejected upgrades by reason
//! - `relay_dial_failures_total` (counter): backend dials that failed
//! - `relay_bytes_total` (counter): bytes relayed by direction
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels are static strings to keep cardinality bounded

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Bytes sent from client to backend.
pub const DIRECTION_INBOUND: &str = "inbound";
/// Bytes sent from backend to client.
pub const DIRECTION_OUTBOUND: &str = "outbound";

/// Install the Prometheus exporter, serving `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics exporter listening");
    Ok(())
}

pub fn record_session_opened() {
    counter!("relay_sessions_total").increment(1);
}

pub fn set_active_sessions(count: usize) {
    gauge!("relay_sessions_active").set(count as f64);
}

/// Count a rejected upgrade. `reason` is the error kind.
pub fn record_rejection(reason: &'static str) {
    counter!("relay_handshake_rejections_total", "reason" => reason).increment(1);
}

pub fn record_dial_failure() {
    counter!("relay_dial_failures_total").increment(1);
}

pub fn record_bytes(direction: &'static str, bytes: u64) {
    if bytes > 0 {
        counter!("relay_bytes_total", "direction" => direction).increment(bytes);
    }
}
