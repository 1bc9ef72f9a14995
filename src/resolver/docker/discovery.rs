//! Discovery cycle: runtime queries → one immutable address table.

use serde::Serialize;
use std::collections::BTreeMap;

use super::client::{DiscoveryError, RuntimeClient};
use super::model::{name_variants, Container, DeploymentSummary, LabelConfig, Protocol, Topology};

/// Service key (`name:port`) → published host port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AddressTable(BTreeMap<String, u16>);

impl AddressTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<u16> {
        self.0.get(key).copied()
    }

    pub fn insert(&mut self, name: &str, port: u16, published: u16) {
        self.0.insert(format!("{}:{}", name, port), published);
    }

    /// Apply `other` on top of `self`; `other` wins on collisions.
    pub fn merge(&mut self, other: AddressTable) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, u16)> for AddressTable {
    fn from_iter<I: IntoIterator<Item = (String, u16)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One published generation of discovery results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub generation: u64,
    pub cluster_mode: bool,
    pub table: AddressTable,
    pub topology: Topology,
}

/// Serializable view of a discovery generation.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoverySummary {
    pub generation: u64,
    pub cluster_mode: bool,
    pub table: AddressTable,
    pub deployments: Vec<DeploymentSummary>,
}

impl Discovery {
    pub fn summary(&self) -> DiscoverySummary {
        DiscoverySummary {
            generation: self.generation,
            cluster_mode: self.cluster_mode,
            table: self.table.clone(),
            deployments: self.topology.summary(),
        }
    }
}

/// Entries for every published TCP port of every running container.
pub fn container_entries(containers: &[Container], labels: &LabelConfig) -> AddressTable {
    let mut table = AddressTable::new();
    for container in containers {
        let override_name = container
            .labels
            .get(&labels.container_name)
            .filter(|name| !name.is_empty());

        for port in &container.ports {
            let published = match port.public_port {
                Some(p) if p > 0 && port.protocol == Protocol::Tcp => p,
                _ => continue,
            };
            if let Some(name) = override_name {
                table.insert(name, port.private_port, published);
                continue;
            }
            for name in &container.names {
                for variant in name_variants(name) {
                    table.insert(variant, port.private_port, published);
                }
            }
        }
    }
    table
}

/// Entries for the active stack of every deployment.
///
/// Each published port is registered under the deployment namespace and
/// under every name variant of the owning service.
pub fn service_entries(topology: &Topology) -> AddressTable {
    let mut table = AddressTable::new();
    for deployment in topology.deployments() {
        let Some(stack) = deployment.active_stack() else {
            continue;
        };
        for service in stack.services() {
            for (target, published) in service.tcp_ports() {
                table.insert(deployment.namespace(), target, published);
                for variant in name_variants(&service.name) {
                    table.insert(variant, target, published);
                }
            }
        }
    }
    table
}

/// Query the runtime and build a complete discovery generation.
///
/// Any query failure aborts the cycle; callers keep the previous table.
pub async fn discover(
    client: &dyn RuntimeClient,
    labels: &LabelConfig,
    generation: u64,
) -> Result<Discovery, DiscoveryError> {
    let cluster_mode = client.cluster_mode().await?;
    let containers = client.list_containers().await?;

    let mut table = container_entries(&containers, labels);
    let topology = if cluster_mode {
        let services = client.list_services().await?;
        Topology::from_services(services, labels)
    } else {
        Topology::default()
    };
    table.merge(service_entries(&topology));

    tracing::debug!(
        generation,
        cluster_mode,
        containers = containers.len(),
        deployments = topology.deployments().count(),
        entries = table.len(),
        "Discovery cycle complete"
    );

    Ok(Discovery {
        generation,
        cluster_mode,
        table,
        topology,
    })
}
