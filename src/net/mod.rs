//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Upgrade accepted by the relay
//!     → connection.rs (session id, registry entry)
//!     → Upgrading → Dialing → Bridging
//!     → guard dropped, session unregistered
//! ```
//!
//! # Design Decisions
//! - Sessions are tracked by a guard so every exit path unregisters
//! - Shutdown drains by watching the live count, not by polling

pub mod connection;

pub use connection::{SessionGuard, SessionId, SessionState, SessionTracker};
