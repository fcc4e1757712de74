//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Relay and host produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!     → spans.rs (per-session spans carrying session and request ids)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG or config)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows from the HTTP layer into every session log line
//! - Metric updates are cheap when no exporter is installed

pub mod logging;
pub mod metrics;
pub mod spans;
