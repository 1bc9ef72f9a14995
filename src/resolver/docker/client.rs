//! Narrow read/subscribe contract over the container runtime.
//!
//! The resolver only ever lists containers, lists services, asks whether
//! the node manages a swarm, and follows the event stream. `BollardClient`
//! implements that against the Docker Engine API.

use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{
    ContainerSummary, EndpointPortConfigProtocolEnum, EventMessage, PortTypeEnum,
};
use bollard::service::ListServicesOptions;
use bollard::system::EventsOptions;
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures_util::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use thiserror::Error;

use super::model::{Container, PortBinding, Protocol, PublishedPort, Service};

/// Failure talking to the runtime.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("docker api error: {0}")]
    Api(#[from] bollard::errors::Error),

    #[error("runtime unavailable: {0}")]
    Unavailable(String),
}

/// A lifecycle event from the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEvent {
    /// Object type (`container`, `network`, `service`).
    pub kind: String,
    /// Action (`start`, `die`, `health_status: healthy`, `exec_create: sh`...).
    pub action: String,
    /// Name or id of the object the event is about.
    pub actor: String,
}

impl RuntimeEvent {
    pub fn new(kind: impl Into<String>, action: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            action: action.into(),
            actor: actor.into(),
        }
    }

    /// Health probes and exec sessions never change published ports.
    pub fn triggers_refresh(&self) -> bool {
        !(self.action.starts_with("health_status") || self.action.starts_with("exec_"))
    }
}

#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Running containers.
    async fn list_containers(&self) -> Result<Vec<Container>, DiscoveryError>;

    /// Orchestrated services. Only called in cluster mode.
    async fn list_services(&self) -> Result<Vec<Service>, DiscoveryError>;

    /// Whether this node can answer service queries (swarm manager).
    async fn cluster_mode(&self) -> Result<bool, DiscoveryError>;

    /// Container, network and service events. Ends on terminal failure.
    fn events(&self) -> BoxStream<'_, Result<RuntimeEvent, DiscoveryError>>;
}

/// Docker Engine API client.
#[derive(Clone)]
pub struct BollardClient {
    docker: Docker,
}

impl BollardClient {
    /// Connect using `DOCKER_HOST` or the local socket.
    pub fn connect() -> Result<Self, DiscoveryError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl RuntimeClient for BollardClient {
    async fn list_containers(&self) -> Result<Vec<Container>, DiscoveryError> {
        let summaries = self
            .docker
            .list_containers(None::<ListContainersOptions<String>>)
            .await?;
        Ok(summaries.into_iter().map(container_from_summary).collect())
    }

    async fn list_services(&self) -> Result<Vec<Service>, DiscoveryError> {
        let services = self
            .docker
            .list_services(None::<ListServicesOptions<String>>)
            .await?;
        Ok(services.into_iter().map(service_from_model).collect())
    }

    async fn cluster_mode(&self) -> Result<bool, DiscoveryError> {
        let info = self.docker.info().await?;
        Ok(info
            .swarm
            .and_then(|swarm| swarm.control_available)
            .unwrap_or(false))
    }

    fn events(&self) -> BoxStream<'_, Result<RuntimeEvent, DiscoveryError>> {
        let mut filters = HashMap::new();
        filters.insert(
            "type".to_string(),
            vec![
                "container".to_string(),
                "network".to_string(),
                "service".to_string(),
            ],
        );
        let options = EventsOptions::<String> {
            filters,
            ..Default::default()
        };
        self.docker
            .events(Some(options))
            .map(|item| item.map(event_from_message).map_err(DiscoveryError::from))
            .boxed()
    }
}

fn container_from_summary(summary: ContainerSummary) -> Container {
    let ports = summary
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|port| PortBinding {
            private_port: port.private_port,
            public_port: port.public_port,
            protocol: match port.typ {
                Some(PortTypeEnum::TCP) => Protocol::Tcp,
                Some(PortTypeEnum::UDP) => Protocol::Udp,
                _ => Protocol::Other,
            },
        })
        .collect();

    Container {
        id: summary.id.unwrap_or_default(),
        names: summary.names.unwrap_or_default(),
        labels: summary.labels.unwrap_or_default(),
        ports,
    }
}

fn service_from_model(service: bollard::models::Service) -> Service {
    let spec = service.spec.unwrap_or_default();
    let name = spec
        .name
        .or(service.id)
        .unwrap_or_default();

    let published_ports = service
        .endpoint
        .and_then(|endpoint| endpoint.ports)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|port| {
            Some(PublishedPort {
                target_port: u16::try_from(port.target_port?).ok()?,
                published_port: u16::try_from(port.published_port?).ok()?,
                protocol: match port.protocol {
                    Some(EndpointPortConfigProtocolEnum::TCP) => Protocol::Tcp,
                    Some(EndpointPortConfigProtocolEnum::UDP) => Protocol::Udp,
                    _ => Protocol::Other,
                },
            })
        })
        .collect();

    Service {
        name,
        labels: spec.labels.unwrap_or_default(),
        published_ports,
        created_at: parse_created_at(service.created_at.as_deref()),
    }
}

fn event_from_message(message: EventMessage) -> RuntimeEvent {
    let kind = message.typ.map(|t| t.to_string()).unwrap_or_default();
    let actor = message
        .actor
        .and_then(|actor| {
            actor
                .attributes
                .and_then(|attrs| attrs.get("name").cloned())
                .or(actor.id)
        })
        .unwrap_or_default();
    RuntimeEvent {
        kind,
        action: message.action.unwrap_or_default(),
        actor,
    }
}

/// Parse an RFC 3339 creation timestamp. Unparseable values sort oldest.
pub fn parse_created_at(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
