//! WebSocket to TCP relay.
//!
//! # Data Flow
//! ```text
//! HTTP request
//!     → gate.rs (filter, origin, handshake, 101 response)
//!     → pool.rs (pooled context holding request metadata)
//!     → session task:
//!         upgrade completes under handshake timeout
//!         → dialer.rs (TCP connect, cancellable)
//!         → bridge.rs (two copy tasks until either side ends)
//!     → context returned to the pool
//!
//! Client ←──── frames ────→ Relay ←──── raw bytes ────→ Backend
//! ```
//!
//! # Design Decisions
//! - The backend never sees framing: payloads in, binary frames out
//! - Every failure is local to one request or one session
//! - No retries: a failed handshake, dial or copy ends the session

pub mod bridge;
pub mod buffer;
pub mod context;
pub mod dialer;
pub mod error;
pub mod filter;
pub mod frame;
pub mod gate;
pub mod handshake;
pub mod pool;

pub use bridge::{Bridge, BridgeStats};
pub use buffer::BufferPool;
pub use context::{ConnectionContext, Locals};
pub use error::RelayError;
pub use filter::Filter;
pub use gate::{relay_layer, Gate, Relay};
pub use pool::ContextPool;
