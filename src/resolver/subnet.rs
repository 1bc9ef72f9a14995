//! Static table resolver.
//!
//! Matching order, first hit wins:
//! 1. full request host
//! 2. first dot-delimited label
//! 3. a mapped source `p` where the host starts with `p.` (longest `p` wins)
//! 4. `NotMapped` when only mapped hosts are proxied
//! 5. `<first label>:80`

use crate::config::{ConfigError, ResolverConfig};
use crate::resolver::grammar::{MappingRule, ProxyMapping, DEFAULT_PORT};
use crate::resolver::{first_label, normalize_host, Destination, ResolutionError};

#[derive(Debug, Clone, Default)]
pub struct SubnetResolver {
    mappings: ProxyMapping,
    only_mapped_hosts: bool,
}

impl SubnetResolver {
    pub const NAME: &'static str = "subnet";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mappings(mappings: ProxyMapping, only_mapped_hosts: bool) -> Self {
        Self {
            mappings,
            only_mapped_hosts,
        }
    }

    pub fn configure(&mut self, config: &ResolverConfig) -> Result<(), ConfigError> {
        self.mappings = ProxyMapping::parse(&config.mappings)?;
        self.only_mapped_hosts = config.only_mapped_hosts;
        tracing::info!(
            mappings = self.mappings.len(),
            only_mapped_hosts = self.only_mapped_hosts,
            "Subnet resolver configured"
        );
        Ok(())
    }

    pub fn mappings(&self) -> &ProxyMapping {
        &self.mappings
    }

    pub fn resolve(&self, request_host: &str) -> Result<Destination, ResolutionError> {
        let host = normalize_host(request_host);

        if let Some(rule) = self.mappings.get(&host) {
            return Ok(to_destination(rule));
        }

        let label = first_label(&host);
        if let Some(rule) = self.mappings.get(label) {
            return Ok(to_destination(rule));
        }

        if let Some(rule) = self.longest_prefix(&host) {
            return Ok(to_destination(rule));
        }

        if self.only_mapped_hosts {
            return Err(ResolutionError::NotMapped {
                host: label.to_string(),
            });
        }

        Ok(Destination::new(label, DEFAULT_PORT))
    }

    fn longest_prefix(&self, host: &str) -> Option<&MappingRule> {
        self.mappings
            .iter()
            .filter(|rule| {
                host.len() > rule.source.len()
                    && host.starts_with(rule.source.as_str())
                    && host.as_bytes()[rule.source.len()] == b'.'
            })
            .max_by_key(|rule| rule.source.len())
    }
}

fn to_destination(rule: &MappingRule) -> Destination {
    Destination::new(rule.destination.clone(), rule.port)
}
