//! Destination resolution subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request Host header
//!     → normalize_host (strip port, lowercase)
//!     → active Resolver (subnet | docker)
//!     → Destination (host:port) or ResolutionError
//!
//! Docker resolver only:
//!     runtime events → discovery rebuild → atomic snapshot swap
//!     resolve() reads one snapshot per call
//! ```
//!
//! # Design Decisions
//! - Closed set of strategies: adding one is an explicit enum variant
//! - Resolver state is private to its variant; readers never lock
//! - Resolution failures are per request and never retried

pub mod docker;
pub mod grammar;
pub mod registry;
pub mod subnet;

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::config::{ConfigError, GatewayConfig};

pub use docker::DockerResolver;
pub use grammar::{MappingError, MappingRule, ProxyMapping};
pub use registry::ResolverRegistry;
pub use subnet::SubnetResolver;

/// Names accepted by the registry, in registration order.
pub const KNOWN_RESOLVERS: [&str; 2] = [SubnetResolver::NAME, DockerResolver::NAME];

/// Concrete backend address chosen for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub host: String,
    pub port: u16,
}

impl Destination {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Per-request resolution failure. Surfaced to clients as 502.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    /// Only mapped hosts are proxied and this one is not mapped.
    #[error("Only configured gateways allowed ('{host}' not found)")]
    NotMapped { host: String },

    /// Every lookup missed the address table.
    #[error("No destination found for host '{host}' (probed: {})", .probed.join(", "))]
    NoDestination { host: String, probed: Vec<String> },
}

impl ResolutionError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolutionError::NotMapped { .. } => "not_mapped",
            ResolutionError::NoDestination { .. } => "no_destination",
        }
    }
}

/// Strip an optional `:port` suffix and lowercase the host.
///
/// Bracketed IPv6 literals keep their brackets.
pub fn normalize_host(host_port: &str) -> String {
    let host = if host_port.starts_with('[') {
        match host_port.find(']') {
            Some(end) => &host_port[..=end],
            None => host_port,
        }
    } else {
        host_port.split(':').next().unwrap_or_default()
    };
    host.to_ascii_lowercase()
}

/// First dot-delimited label of a host.
pub fn first_label(host: &str) -> &str {
    host.split('.').next().unwrap_or(host)
}

/// Read-only view of resolver state for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct ResolverSnapshot {
    pub name: &'static str,
    pub mappings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery: Option<docker::DiscoverySummary>,
}

/// The destination resolution strategy selected at startup.
pub enum Resolver {
    Subnet(SubnetResolver),
    Docker(DockerResolver),
}

impl Resolver {
    /// Stable identifier used for selection.
    pub fn name(&self) -> &'static str {
        match self {
            Resolver::Subnet(_) => SubnetResolver::NAME,
            Resolver::Docker(_) => DockerResolver::NAME,
        }
    }

    /// One-time setup. Any error here is fatal to startup.
    pub async fn configure(&mut self, config: &GatewayConfig) -> Result<(), ConfigError> {
        match self {
            Resolver::Subnet(subnet) => subnet.configure(&config.resolver),
            Resolver::Docker(docker) => docker.configure(config).await,
        }
    }

    /// Map a request `host[:port]` to a backend address.
    pub fn resolve(&self, request_host: &str) -> Result<Destination, ResolutionError> {
        let result = match self {
            Resolver::Subnet(subnet) => subnet.resolve(request_host),
            Resolver::Docker(docker) => docker.resolve(request_host),
        };
        match &result {
            Ok(destination) => {
                tracing::debug!(
                    resolver = self.name(),
                    host = %request_host,
                    destination = %destination,
                    "Resolved destination"
                );
            }
            Err(e) => {
                tracing::debug!(resolver = self.name(), host = %request_host, error = %e, "Resolution failed");
                crate::observability::metrics::record_resolution_failure(self.name(), e.kind());
            }
        }
        result
    }

    pub fn snapshot(&self) -> ResolverSnapshot {
        match self {
            Resolver::Subnet(subnet) => ResolverSnapshot {
                name: SubnetResolver::NAME,
                mappings: sorted_rules(subnet.mappings()),
                discovery: None,
            },
            Resolver::Docker(docker) => ResolverSnapshot {
                name: DockerResolver::NAME,
                mappings: sorted_rules(docker.mappings()),
                discovery: Some(docker.summary()),
            },
        }
    }

    /// Stop background work owned by the resolver.
    pub fn stop(&self) {
        if let Resolver::Docker(docker) = self {
            docker.stop();
        }
    }
}

fn sorted_rules(mapping: &ProxyMapping) -> Vec<String> {
    let mut rules: Vec<String> = mapping.iter().map(|r| r.to_string()).collect();
    rules.sort();
    rules
}
