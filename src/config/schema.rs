//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::resolver::docker::{LabelConfig, DEFAULT_STACK_PATTERN};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Plain HTTP listener.
    pub listener: ListenerConfig,

    /// Destination resolver selection and static mappings.
    pub resolver: ResolverConfig,

    /// Docker discovery settings. Only read by the docker resolver.
    pub docker: DockerConfig,

    /// Optional TLS listener.
    pub tls: Option<TlsConfig>,

    /// Traffic inspection (diagnostic logging of full exchanges).
    pub inspect: InspectConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

impl GatewayConfig {
    /// Label names used to group discovered services.
    pub fn labels(&self) -> LabelConfig {
        LabelConfig {
            stack: self.docker.stack_label.clone(),
            deployment: self.docker.deployment_label.clone(),
            health: self.docker.health_label.clone(),
            container_name: self.docker.container_name_label.clone(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:80").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:80".to_string(),
        }
    }
}

/// Resolver selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Registered resolver name (`subnet` or `docker`).
    pub name: String,

    /// Whitespace-separated `src[:dst[:port]]` tokens.
    pub mappings: String,

    /// Reject hosts that match no mapping instead of falling back.
    ///
    /// When false, any unmatched host is sent to `<name>:80`, which can
    /// expose backends that were never meant to be public.
    pub only_mapped_hosts: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            name: "subnet".to_string(),
            mappings: String::new(),
            only_mapped_hosts: false,
        }
    }
}

/// Docker discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Label grouping services into stacks.
    pub stack_label: String,

    /// Label grouping stacks into deployments. Empty uses the stack name.
    pub deployment_label: String,

    /// Label that must read `"true"` on every service of a healthy stack.
    pub health_label: String,

    /// Container label overriding the registered container name.
    pub container_name_label: String,

    /// Regex whose first capture group selects the stack key from a host.
    pub stack_search_pattern: String,

    /// Base hostname; the label before it is used as the stack key.
    pub base_hostname: Option<String>,

    /// Address published ports are reached on. Detected when unset.
    pub gateway_ip: Option<String>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        let labels = LabelConfig::default();
        Self {
            stack_label: labels.stack,
            deployment_label: labels.deployment,
            health_label: labels.health,
            container_name_label: labels.container_name,
            stack_search_pattern: DEFAULT_STACK_PATTERN.to_string(),
            base_hostname: None,
            gateway_ip: None,
        }
    }
}

/// TLS listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,

    /// TLS bind address.
    #[serde(default = "default_tls_bind")]
    pub bind_address: String,

    /// Hosts still served over plain HTTP. Others are redirected.
    #[serde(default)]
    pub http_hosts: Vec<String>,
}

fn default_tls_bind() -> String {
    "0.0.0.0:443".to_string()
}

/// Traffic inspection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InspectConfig {
    /// Log full request and response exchanges.
    pub enabled: bool,

    /// Bodies longer than this are truncated in the log.
    pub max_logged_body_bytes: usize,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_logged_body_bytes: 4096,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log format (pretty, compact, json).
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
