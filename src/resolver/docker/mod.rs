//! Docker resolver: destinations discovered from the container runtime.
//!
//! # Data Flow
//! ```text
//! configure():
//!     connect → cluster-mode probe → initial discovery → spawn watcher
//!
//! watcher (one task, sole writer):
//!     event → full discovery → ArcSwap::store(new generation)
//!
//! resolve() (any number of request tasks):
//!     ArcSwap::load → explicit mapping → stack pattern → fallback
//! ```
//!
//! # Design Decisions
//! - The address table is rebuilt from scratch, never patched
//! - A failed cycle keeps the previous generation published
//! - The watcher does not reconnect; the last table keeps serving

pub mod client;
pub mod discovery;
pub mod events;
pub mod model;

use arc_swap::ArcSwap;
use regex::Regex;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, GatewayConfig};
use crate::lifecycle::shutdown::Shutdown;
use crate::resolver::grammar::{ProxyMapping, DEFAULT_PORT};
use crate::resolver::{normalize_host, Destination, ResolutionError};

pub use client::{BollardClient, DiscoveryError, RuntimeClient, RuntimeEvent};
pub use discovery::{AddressTable, Discovery, DiscoverySummary};
pub use model::{Container, LabelConfig, PortBinding, Protocol, PublishedPort, Service};

/// Default stack-search pattern: the label right before an environment suffix.
pub const DEFAULT_STACK_PATTERN: &str = r"([^\.]+)\.(local|dev|build|test|stage|preprod|prod)\.";

pub struct DockerResolver {
    client: Option<Arc<dyn RuntimeClient>>,
    mappings: ProxyMapping,
    only_mapped_hosts: bool,
    stack_pattern: Option<Regex>,
    base_hostname: Option<String>,
    gateway_ip: String,
    labels: LabelConfig,
    current: Arc<ArcSwap<Discovery>>,
    shutdown: Shutdown,
    watcher: Option<JoinHandle<()>>,
}

impl DockerResolver {
    pub const NAME: &'static str = "docker";

    /// A resolver that connects to the local Docker daemon on configure.
    pub fn new() -> Self {
        Self {
            client: None,
            mappings: ProxyMapping::default(),
            only_mapped_hosts: false,
            stack_pattern: None,
            base_hostname: None,
            gateway_ip: String::new(),
            labels: LabelConfig::default(),
            current: Arc::new(ArcSwap::from_pointee(Discovery::default())),
            shutdown: Shutdown::new(),
            watcher: None,
        }
    }

    /// A resolver backed by an already constructed runtime client.
    pub fn with_client(client: Arc<dyn RuntimeClient>) -> Self {
        Self {
            client: Some(client),
            ..Self::new()
        }
    }

    pub async fn configure(&mut self, config: &GatewayConfig) -> Result<(), ConfigError> {
        self.mappings = ProxyMapping::parse(&config.resolver.mappings)?;
        self.only_mapped_hosts = config.resolver.only_mapped_hosts;
        self.stack_pattern = Some(Regex::new(&config.docker.stack_search_pattern)?);
        self.base_hostname = config
            .docker
            .base_hostname
            .as_deref()
            .map(|base| base.trim_matches('.').to_ascii_lowercase())
            .filter(|base| !base.is_empty());
        self.gateway_ip = match &config.docker.gateway_ip {
            Some(ip) => ip.clone(),
            None => crate::net::gateway::default_gateway().to_string(),
        };
        self.labels = config.labels();

        let client = match &self.client {
            Some(client) => Arc::clone(client),
            None => {
                let client: Arc<dyn RuntimeClient> = Arc::new(BollardClient::connect()?);
                self.client = Some(Arc::clone(&client));
                client
            }
        };

        let initial = discovery::discover(client.as_ref(), &self.labels, 1).await?;
        crate::observability::metrics::set_address_table_size(initial.table.len());
        tracing::info!(
            gateway_ip = %self.gateway_ip,
            cluster_mode = initial.cluster_mode,
            mappings = self.mappings.len(),
            entries = initial.table.len(),
            "Docker resolver configured"
        );
        self.current.store(Arc::new(initial));

        let watcher = tokio::spawn(events::watch(
            client,
            Arc::clone(&self.current),
            self.labels.clone(),
            self.shutdown.subscribe(),
        ));
        self.watcher = Some(watcher);
        Ok(())
    }

    pub fn resolve(&self, request_host: &str) -> Result<Destination, ResolutionError> {
        let host = normalize_host(request_host);
        let discovery = self.current.load();
        let table = &discovery.table;
        let mut probed = Vec::new();

        probed.push(host.clone());
        if let Some(rule) = self.mappings.get(&host) {
            return self.lookup(table, rule.service_key(), &host, probed);
        }

        let captured = self.capture(&host);
        if let Some(key) = captured.as_deref() {
            probed.push(key.to_string());
            if let Some(rule) = self.mappings.get(key) {
                return self.lookup(table, rule.service_key(), key, probed);
            }
        }

        let key = captured.unwrap_or(host);
        if self.only_mapped_hosts {
            return Err(ResolutionError::NotMapped { host: key });
        }

        let service_key = format!("{}:{}", key, DEFAULT_PORT);
        self.lookup(table, service_key, &key, probed)
    }

    fn lookup(
        &self,
        table: &AddressTable,
        service_key: String,
        host: &str,
        mut probed: Vec<String>,
    ) -> Result<Destination, ResolutionError> {
        match table.get(&service_key) {
            Some(published) => Ok(Destination::new(self.gateway_ip.clone(), published)),
            None => {
                probed.push(service_key);
                Err(ResolutionError::NoDestination {
                    host: host.to_string(),
                    probed,
                })
            }
        }
    }

    /// Stack key captured from the host, if any.
    fn capture(&self, host: &str) -> Option<String> {
        // Pattern matching runs on the host with a trailing dot so the final
        // environment label still sees its delimiter.
        let dotted = format!("{}.", host);
        let from_pattern = self
            .stack_pattern
            .as_ref()
            .and_then(|pattern| pattern.captures(&dotted))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|key| !key.is_empty());
        if from_pattern.is_some() {
            return from_pattern;
        }

        let base = self.base_hostname.as_deref()?;
        let prefix = host.strip_suffix(base)?.strip_suffix('.')?;
        prefix
            .rsplit('.')
            .next()
            .filter(|label| !label.is_empty())
            .map(str::to_string)
    }

    pub fn mappings(&self) -> &ProxyMapping {
        &self.mappings
    }

    pub fn gateway_ip(&self) -> &str {
        &self.gateway_ip
    }

    /// The currently published discovery generation.
    pub fn discovery(&self) -> Arc<Discovery> {
        self.current.load_full()
    }

    pub fn summary(&self) -> DiscoverySummary {
        self.current.load().summary()
    }

    /// Whether the background event watcher is still running.
    pub fn is_watching(&self) -> bool {
        self.watcher
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Signal the event watcher to exit.
    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}

impl Default for DockerResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream::{self, BoxStream, StreamExt};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    type EventResult = Result<RuntimeEvent, DiscoveryError>;

    #[derive(Default)]
    struct MemoryRuntime {
        containers: Mutex<Vec<Container>>,
        services: Mutex<Vec<Service>>,
        cluster: bool,
        failing: AtomicBool,
        listings: AtomicUsize,
        events: Mutex<Option<mpsc::UnboundedReceiver<EventResult>>>,
    }

    impl MemoryRuntime {
        fn with_containers(containers: Vec<Container>) -> (Arc<Self>, mpsc::UnboundedSender<EventResult>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let runtime = Self {
                containers: Mutex::new(containers),
                events: Mutex::new(Some(rx)),
                ..Default::default()
            };
            (Arc::new(runtime), tx)
        }

        fn clustered(services: Vec<Service>) -> (Arc<Self>, mpsc::UnboundedSender<EventResult>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let runtime = Self {
                services: Mutex::new(services),
                cluster: true,
                events: Mutex::new(Some(rx)),
                ..Default::default()
            };
            (Arc::new(runtime), tx)
        }
    }

    #[async_trait::async_trait]
    impl RuntimeClient for MemoryRuntime {
        async fn list_containers(&self) -> Result<Vec<Container>, DiscoveryError> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(DiscoveryError::Unavailable("daemon busy".into()));
            }
            Ok(self.containers.lock().unwrap().clone())
        }

        async fn list_services(&self) -> Result<Vec<Service>, DiscoveryError> {
            Ok(self.services.lock().unwrap().clone())
        }

        async fn cluster_mode(&self) -> Result<bool, DiscoveryError> {
            Ok(self.cluster)
        }

        fn events(&self) -> BoxStream<'_, EventResult> {
            match self.events.lock().unwrap().take() {
                Some(rx) => stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|event| (event, rx))
                })
                .boxed(),
                None => stream::empty().boxed(),
            }
        }
    }

    fn container(name: &str, private: u16, public: u16) -> Container {
        Container {
            id: format!("id-{}", name),
            names: vec![format!("/{}", name)],
            labels: HashMap::new(),
            ports: vec![PortBinding {
                private_port: private,
                public_port: Some(public),
                protocol: Protocol::Tcp,
            }],
        }
    }

    fn config(mappings: &str, only_mapped: bool) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.resolver.name = DockerResolver::NAME.into();
        config.resolver.mappings = mappings.into();
        config.resolver.only_mapped_hosts = only_mapped;
        config.docker.gateway_ip = Some("10.0.0.1".into());
        config
    }

    async fn configured(
        runtime: Arc<MemoryRuntime>,
        config: &GatewayConfig,
    ) -> DockerResolver {
        let mut resolver = DockerResolver::with_client(runtime);
        resolver.configure(config).await.unwrap();
        resolver
    }

    async fn wait_for_generation(resolver: &DockerResolver, generation: u64) {
        for _ in 0..100 {
            if resolver.discovery().generation >= generation {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("generation {} never published", generation);
    }

    fn example_runtime() -> (Arc<MemoryRuntime>, mpsc::UnboundedSender<EventResult>) {
        MemoryRuntime::with_containers(vec![
            container("bob", 80, 5),
            container("abc", 3000, 18),
            container("web", 80, 42),
        ])
    }

    #[tokio::test]
    async fn test_resolves_through_mappings_and_stack_pattern() {
        let (runtime, _events) = example_runtime();
        let resolver = configured(runtime, &config("src:bob:80 abc:3000 web.site.com:web", false)).await;

        let resolve = |host: &str| resolver.resolve(host).unwrap().to_string();
        assert_eq!(resolve("abc.bob.local.test.tld"), "10.0.0.1:5");
        assert_eq!(resolve("abc.abc.local.test.tld"), "10.0.0.1:18");
        assert_eq!(resolve("web.site.com"), "10.0.0.1:42");
        assert_eq!(resolve("WEB.site.com:8080"), "10.0.0.1:42");
        resolver.stop();
    }

    #[tokio::test]
    async fn test_mapped_source_without_table_entry() {
        let (runtime, _events) = MemoryRuntime::with_containers(vec![]);
        let resolver = configured(runtime, &config("web.site.com:web", false)).await;

        match resolver.resolve("web.site.com") {
            Err(ResolutionError::NoDestination { host, probed }) => {
                assert_eq!(host, "web.site.com");
                assert_eq!(probed, vec!["web.site.com", "web:80"]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fallback_probes_every_key() {
        let (runtime, _events) = MemoryRuntime::with_containers(vec![]);
        let resolver = configured(runtime, &config("", false)).await;

        match resolver.resolve("shop.dev.example.com") {
            Err(ResolutionError::NoDestination { probed, .. }) => {
                assert_eq!(probed, vec!["shop.dev.example.com", "shop", "shop:80"]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_only_mapped_hosts() {
        let (runtime, _events) = example_runtime();
        let resolver = configured(runtime, &config("web.site.com:web", true)).await;

        assert!(resolver.resolve("web.site.com").is_ok());
        assert_eq!(
            resolver.resolve("bob.local.test"),
            Err(ResolutionError::NotMapped { host: "bob".into() })
        );
    }

    #[tokio::test]
    async fn test_base_hostname_selects_label() {
        let (runtime, _events) = example_runtime();
        let mut cfg = config("", false);
        cfg.docker.base_hostname = Some("apps.example.com".into());
        let resolver = configured(runtime, &cfg).await;

        assert_eq!(
            resolver.resolve("x.bob.apps.example.com").unwrap().to_string(),
            "10.0.0.1:5"
        );
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_config_error() {
        let (runtime, _events) = example_runtime();
        let mut cfg = config("", false);
        cfg.docker.stack_search_pattern = "([".into();
        let mut resolver = DockerResolver::with_client(runtime);
        assert!(matches!(
            resolver.configure(&cfg).await,
            Err(ConfigError::Pattern(_))
        ));
    }

    #[tokio::test]
    async fn test_initial_discovery_failure_is_fatal() {
        let (runtime, _events) = example_runtime();
        runtime.failing.store(true, Ordering::SeqCst);
        let mut resolver = DockerResolver::with_client(runtime);
        assert!(matches!(
            resolver.configure(&config("", false)).await,
            Err(ConfigError::Discovery(_))
        ));
    }

    #[tokio::test]
    async fn test_events_rebuild_table() {
        let (runtime, events) = MemoryRuntime::with_containers(vec![]);
        let resolver = configured(Arc::clone(&runtime), &config("", false)).await;
        assert!(resolver.resolve("bob.local.x").is_err());

        runtime.containers.lock().unwrap().push(container("bob", 80, 5));
        events.send(Ok(RuntimeEvent::new("container", "start", "bob"))).unwrap();
        wait_for_generation(&resolver, 2).await;

        assert_eq!(resolver.resolve("bob.local.x").unwrap().to_string(), "10.0.0.1:5");
    }

    #[tokio::test]
    async fn test_health_and_exec_events_are_ignored() {
        let (runtime, events) = MemoryRuntime::with_containers(vec![container("bob", 80, 5)]);
        let resolver = configured(Arc::clone(&runtime), &config("", false)).await;
        let before = runtime.listings.load(Ordering::SeqCst);

        events.send(Ok(RuntimeEvent::new("container", "health_status: healthy", "bob"))).unwrap();
        events.send(Ok(RuntimeEvent::new("container", "exec_start: sh", "bob"))).unwrap();
        events.send(Ok(RuntimeEvent::new("container", "die", "bob"))).unwrap();
        wait_for_generation(&resolver, 2).await;

        assert_eq!(runtime.listings.load(Ordering::SeqCst), before + 1);
        assert_eq!(resolver.discovery().generation, 2);
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_previous_table() {
        let (runtime, events) = MemoryRuntime::with_containers(vec![container("bob", 80, 5)]);
        let resolver = configured(Arc::clone(&runtime), &config("", false)).await;

        runtime.failing.store(true, Ordering::SeqCst);
        let before = runtime.listings.load(Ordering::SeqCst);
        events.send(Ok(RuntimeEvent::new("container", "stop", "bob"))).unwrap();
        for _ in 0..100 {
            if runtime.listings.load(Ordering::SeqCst) > before {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(resolver.discovery().generation, 1);
        assert_eq!(resolver.resolve("bob.local.x").unwrap().to_string(), "10.0.0.1:5");
        assert!(resolver.is_watching());
    }

    #[tokio::test]
    async fn test_stream_error_stops_watcher_but_keeps_serving() {
        let (runtime, events) = example_runtime();
        let resolver = configured(runtime, &config("", false)).await;

        events
            .send(Err(DiscoveryError::Unavailable("connection reset".into())))
            .unwrap();
        for _ in 0..100 {
            if !resolver.is_watching() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(!resolver.is_watching());
        assert_eq!(resolver.resolve("bob.local.x").unwrap().to_string(), "10.0.0.1:5");
    }

    #[tokio::test]
    async fn test_stop_ends_watcher() {
        let (runtime, _events) = example_runtime();
        let resolver = configured(runtime, &config("", false)).await;
        assert!(resolver.is_watching());

        resolver.stop();
        for _ in 0..100 {
            if !resolver.is_watching() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!resolver.is_watching());
    }

    #[tokio::test]
    async fn test_blue_green_cutover() {
        use model::tests::service;

        let (runtime, events) = MemoryRuntime::clustered(vec![
            service("blue_web", "blue", true, 100),
            service("green_web", "green", false, 200),
        ]);
        let mut cfg = config("", false);
        cfg.docker.deployment_label = "app".into();
        cfg.docker.health_label = "healthy".into();
        let resolver = configured(Arc::clone(&runtime), &cfg).await;

        // Green exists but is not healthy yet.
        assert_eq!(resolver.resolve("shop.local.x").unwrap().port, 30100);

        *runtime.services.lock().unwrap() = vec![
            service("blue_web", "blue", true, 100),
            service("green_web", "green", true, 200),
        ];
        events.send(Ok(RuntimeEvent::new("service", "update", "green_web"))).unwrap();
        wait_for_generation(&resolver, 2).await;

        assert_eq!(resolver.resolve("shop.local.x").unwrap().port, 30200);
        assert!(resolver.resolve("blue_web.local.x").is_err());
        let summary = resolver.summary();
        assert_eq!(summary.deployments[0].active_stack.as_deref(), Some("green"));
    }

    #[tokio::test]
    async fn test_discovery_is_idempotent() {
        let (runtime, _events) = example_runtime();
        let labels = LabelConfig::default();
        let first = discovery::discover(runtime.as_ref(), &labels, 1).await.unwrap();
        let second = discovery::discover(runtime.as_ref(), &labels, 2).await.unwrap();
        assert_eq!(first.table, second.table);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_observe_torn_table() {
        // Every generation maps "a" and "b" to the same port, so a reader
        // seeing different ports saw two generations at once.
        let (runtime, _events) = MemoryRuntime::with_containers(vec![
            container("a", 80, 1),
            container("b", 80, 1),
        ]);
        let resolver = Arc::new(configured(Arc::clone(&runtime), &config("", false)).await);
        resolver.stop();

        let writer = {
            let runtime = Arc::clone(&runtime);
            let current = Arc::clone(&resolver.current);
            tokio::spawn(async move {
                for port in 2..200u16 {
                    *runtime.containers.lock().unwrap() =
                        vec![container("a", 80, port), container("b", 80, port)];
                    events::refresh(runtime.as_ref(), &current, &LabelConfig::default()).await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move {
                    for _ in 0..500 {
                        let discovery = resolver.discovery();
                        assert_eq!(discovery.table.get("a:80"), discovery.table.get("b:80"));
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(resolver.discovery().generation, 199);
    }
}
