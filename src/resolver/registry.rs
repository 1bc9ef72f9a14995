//! Name → resolver constructor table.

use crate::config::{ConfigError, GatewayConfig};
use crate::resolver::{DockerResolver, Resolver, SubnetResolver};

type Factory = Box<dyn Fn() -> Resolver + Send + Sync>;

/// Resolvers selectable by name. Activation configures exactly one.
pub struct ResolverRegistry {
    factories: Vec<(&'static str, Factory)>,
}

impl ResolverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Registry holding the subnet and docker resolvers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(SubnetResolver::NAME, || {
            Resolver::Subnet(SubnetResolver::new())
        });
        registry.register(DockerResolver::NAME, || {
            Resolver::Docker(DockerResolver::new())
        });
        registry
    }

    /// Add a resolver. A later registration under the same name replaces
    /// the earlier one.
    pub fn register<F>(&mut self, name: &'static str, factory: F)
    where
        F: Fn() -> Resolver + Send + Sync + 'static,
    {
        self.factories.retain(|(existing, _)| *existing != name);
        self.factories.push((name, Box::new(factory)));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|(name, _)| *name).collect()
    }

    /// Build and configure the resolver named in `config.resolver.name`.
    pub async fn activate(&self, config: &GatewayConfig) -> Result<Resolver, ConfigError> {
        let name = config.resolver.name.as_str();
        let factory = self
            .factories
            .iter()
            .find(|(registered, _)| *registered == name)
            .map(|(_, factory)| factory)
            .ok_or_else(|| ConfigError::UnknownResolver(name.to_string()))?;

        let mut resolver = factory();
        resolver.configure(config).await?;
        tracing::info!(resolver = resolver.name(), "Destination resolver active");
        Ok(resolver)
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
