//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated)
//!     → RelaySettings::to_relay_config → RelayConfig
//!     → relay.rs resolve() → ResolvedConfig (immutable, shared via Arc)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → command-line overrides re-applied
//!     → new ResolvedConfig swapped in for subsequent sessions
//! ```
//!
//! # Design Decisions
//! - Resolved config is immutable; running sessions keep the one they started with
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod relay;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use relay::{RelayConfig, ResolvedConfig};
pub use schema::ServerConfig;
pub use schema::ConfigOverrides;
pub use schema::ListenerConfig;
pub use schema::BackendConfig;
pub use schema::RelaySettings;
