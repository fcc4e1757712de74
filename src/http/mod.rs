//! HTTP host for the relay.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum router, request ID, trace layer)
//!     → request.rs (request ID generated or kept)
//!     → relay path: relay_layer (upgrade or reject)
//!     → /health, /status, /sessions: plain handlers
//! ```

pub mod request;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::HttpServer;
