//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → cli.rs (flags and environment override file values)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → resolver registry + servers
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cli::Args;
pub use loader::{read_config, ConfigError};
pub use schema::{
    AdminConfig, DockerConfig, GatewayConfig, InspectConfig, ListenerConfig,
    ObservabilityConfig, ResolverConfig, TlsConfig,
};
pub use validation::{validate_config, ValidationError};
