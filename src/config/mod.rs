//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → environment overrides (credential, base URL, origin, bind)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup and never mutated afterwards
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - The credential never leaves the process in logs or serialized form

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_startup_config, ConfigError};
pub use schema::{
    CorsConfig, Credential, LimitsConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    ProxyConfig, ServerlessConfig, TimeoutConfig, UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
