//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, resolver names, mapping grammar and patterns
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::resolver::{ProxyMapping, KNOWN_RESOLVERS};

/// A single semantic problem with a configuration value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket(&mut errors, "listener.bind_address", &config.listener.bind_address);

    if !KNOWN_RESOLVERS.contains(&config.resolver.name.as_str()) {
        errors.push(ValidationError::new(
            "resolver.name",
            format!(
                "unknown resolver '{}' (expected one of: {})",
                config.resolver.name,
                KNOWN_RESOLVERS.join(", ")
            ),
        ));
    }

    if let Err(e) = ProxyMapping::parse(&config.resolver.mappings) {
        errors.push(ValidationError::new("resolver.mappings", e.to_string()));
    }

    if let Err(e) = regex::Regex::new(&config.docker.stack_search_pattern) {
        errors.push(ValidationError::new("docker.stack_search_pattern", e.to_string()));
    }

    if config.docker.stack_label.is_empty() {
        errors.push(ValidationError::new("docker.stack_label", "must not be empty"));
    }

    if let Some(ip) = &config.docker.gateway_ip {
        if ip.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::new(
                "docker.gateway_ip",
                format!("'{}' is not an IP address", ip),
            ));
        }
    }

    if let Some(tls) = &config.tls {
        if tls.cert_path.is_empty() {
            errors.push(ValidationError::new("tls.cert_path", "must not be empty"));
        }
        if tls.key_path.is_empty() {
            errors.push(ValidationError::new("tls.key_path", "must not be empty"));
        }
        check_socket(&mut errors, "tls.bind_address", &tls.bind_address);
    }

    if !LOG_FORMATS.contains(&config.observability.log_format.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("expected one of: {}", LOG_FORMATS.join(", ")),
        ));
    }
    if config.observability.metrics_enabled {
        check_socket(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.admin.enabled {
        check_socket(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field,
            format!("'{}' is not a socket address", value),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TlsConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_problem() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.resolver.name = "consul".into();
        config.docker.stack_search_pattern = "([".into();
        config.docker.gateway_ip = Some("gateway".into());
        config.tls = Some(TlsConfig {
            cert_path: "cert.pem".into(),
            key_path: String::new(),
            bind_address: "0.0.0.0:443".into(),
            http_hosts: Vec::new(),
        });

        let fields: Vec<String> = validate_config(&config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "resolver.name",
                "docker.stack_search_pattern",
                "docker.gateway_ip",
                "tls.key_path",
            ]
        );
    }

    #[test]
    fn test_admin_checked_only_when_enabled() {
        let mut config = GatewayConfig::default();
        config.admin.bind_address = "bad".into();
        assert!(validate_config(&config).is_ok());
        config.admin.enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
