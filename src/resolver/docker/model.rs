//! Runtime topology: containers, services, stacks and deployments.
//!
//! # Stack selection
//! ```text
//! services ──group by stack label──▶ stacks ──group by namespace──▶ deployments
//!
//! active stack = newest healthy stack, else newest stack
//! ```
//!
//! Every value here is rebuilt from scratch on each discovery cycle and is
//! never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Transport protocol of a port binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    Other,
}

/// A container port, optionally published on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub private_port: u16,
    pub public_port: Option<u16>,
    pub protocol: Protocol,
}

/// A running container as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    pub names: Vec<String>,
    pub labels: HashMap<String, String>,
    pub ports: Vec<PortBinding>,
}

/// A port published by an orchestrated service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPort {
    pub target_port: u16,
    pub published_port: u16,
    pub protocol: Protocol,
}

/// An orchestrated (swarm) service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub labels: HashMap<String, String>,
    pub published_ports: Vec<PublishedPort>,
    pub created_at: DateTime<Utc>,
}

impl Service {
    /// Published TCP ports as `(target, published)` pairs.
    pub fn tcp_ports(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.published_ports
            .iter()
            .filter(|p| p.protocol == Protocol::Tcp && p.published_port > 0)
            .map(|p| (p.target_port, p.published_port))
    }
}

/// Label names that drive grouping and health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelConfig {
    /// Groups services into stacks.
    pub stack: String,
    /// Groups stacks into deployments. Empty falls back to the stack name.
    pub deployment: String,
    /// Must be `"true"` on every member for a stack to be healthy.
    pub health: String,
    /// Overrides a container's registered name.
    pub container_name: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            stack: "com.docker.stack.namespace".to_string(),
            deployment: String::new(),
            health: String::new(),
            container_name: "gateway.stack.name".to_string(),
        }
    }
}

/// Services deployed together under one stack label value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    name: String,
    services: Vec<Service>,
    created_at: DateTime<Utc>,
    healthy: bool,
    namespace: String,
}

impl Stack {
    /// Build a stack. `services` must not be empty.
    fn new(name: String, services: Vec<Service>, labels: &LabelConfig) -> Self {
        let created_at = services
            .iter()
            .map(|s| s.created_at)
            .min()
            .unwrap_or_default();
        let healthy = services.iter().all(|s| {
            s.labels
                .get(&labels.health)
                .map(|v| v == "true")
                .unwrap_or(false)
        });
        let declared = services
            .iter()
            .filter(|_| !labels.deployment.is_empty())
            .find_map(|s| s.labels.get(&labels.deployment).cloned());
        let namespace = declared.unwrap_or_else(|| name.clone());

        Self {
            name,
            services,
            created_at,
            healthy,
            namespace,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Earliest creation time among member services.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn recency(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, self.name.as_str())
    }
}

/// Successive stacks of one logical service, sharing a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    namespace: String,
    stacks: Vec<Stack>,
}

impl Deployment {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    /// Newest healthy stack, or the newest stack if none is healthy.
    ///
    /// Only `None` for a deployment without stacks, which discovery never
    /// builds.
    pub fn active_stack(&self) -> Option<&Stack> {
        self.stacks
            .iter()
            .filter(|s| s.is_healthy())
            .max_by(|a, b| a.recency().cmp(&b.recency()))
            .or_else(|| self.stacks.iter().max_by(|a, b| a.recency().cmp(&b.recency())))
    }
}

/// Orchestrated services grouped into deployments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    deployments: BTreeMap<String, Deployment>,
}

impl Topology {
    pub fn from_services(services: Vec<Service>, labels: &LabelConfig) -> Self {
        let mut by_stack: BTreeMap<String, Vec<Service>> = BTreeMap::new();
        for service in services {
            // Unlabelled services stand alone as single-service stacks.
            let stack_name = service
                .labels
                .get(&labels.stack)
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| service.name.clone());
            by_stack.entry(stack_name).or_default().push(service);
        }

        let mut deployments: BTreeMap<String, Deployment> = BTreeMap::new();
        for (name, mut services) in by_stack {
            services.sort_by(|a, b| a.name.cmp(&b.name));
            let stack = Stack::new(name, services, labels);
            deployments
                .entry(stack.namespace().to_string())
                .or_insert_with(|| Deployment {
                    namespace: stack.namespace().to_string(),
                    stacks: Vec::new(),
                })
                .stacks
                .push(stack);
        }

        Self { deployments }
    }

    pub fn deployments(&self) -> impl Iterator<Item = &Deployment> {
        self.deployments.values()
    }

    pub fn deployment(&self, namespace: &str) -> Option<&Deployment> {
        self.deployments.get(namespace)
    }

    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty()
    }

    pub fn summary(&self) -> Vec<DeploymentSummary> {
        self.deployments()
            .map(|d| DeploymentSummary {
                namespace: d.namespace().to_string(),
                active_stack: d.active_stack().map(|s| s.name().to_string()),
                stacks: d
                    .stacks()
                    .iter()
                    .map(|s| StackSummary {
                        name: s.name().to_string(),
                        healthy: s.is_healthy(),
                        created_at: s.created_at(),
                        services: s.services().iter().map(|svc| svc.name.clone()).collect(),
                    })
                    .collect(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentSummary {
    pub namespace: String,
    pub active_stack: Option<String>,
    pub stacks: Vec<StackSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StackSummary {
    pub name: String,
    pub healthy: bool,
    pub created_at: DateTime<Utc>,
    pub services: Vec<String>,
}

/// Every name a runtime object answers to, from most to least specific.
///
/// `"/stack_service_1"` → `["stack_service_1", "stack_service", "stack"]`.
pub fn name_variants(name: &str) -> Vec<&str> {
    let mut current = name.trim_start_matches('/');
    let mut variants = Vec::new();
    loop {
        if !current.is_empty() {
            variants.push(current);
        }
        match current.rfind('_') {
            Some(idx) => current = &current[..idx],
            None => break,
        }
    }
    variants
}
