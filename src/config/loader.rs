//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::ValidationError;
use crate::resolver::docker::DiscoveryError;
use crate::resolver::MappingError;

/// Fatal configuration error. Any of these aborts startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("unknown destination resolver '{0}'")]
    UnknownResolver(String),

    #[error("invalid proxy mappings: {0}")]
    Mapping(#[from] MappingError),

    #[error("invalid stack search pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("docker discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load a TOML file without validating it.
///
/// Callers apply command-line overrides before running validation.
pub fn read_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GatewayConfig = toml::from_str(&content)?;
    Ok(config)
}
