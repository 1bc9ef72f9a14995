//! Shared utilities for integration testing.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, Uri};
use axum::routing::get;
use axum::Router;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use stack_gateway::config::GatewayConfig;
use stack_gateway::lifecycle::Shutdown;
use stack_gateway::resolver::docker::{
    Container, DiscoveryError, PortBinding, Protocol, RuntimeClient, RuntimeEvent, Service,
};
use stack_gateway::{GatewayServer, Resolver, ResolverRegistry};

/// A port nothing is listening on.
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Backend that answers every request with `name`, the Host it saw, the
/// path and the forwarded-for chain.
pub async fn start_echo_backend(name: &'static str) -> SocketAddr {
    serve(Router::new().fallback(move |headers: HeaderMap, uri: Uri| async move {
        let header = |key: &str| {
            headers
                .get(key)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_string()
        };
        format!(
            "backend={} host={} path={} xff={}",
            name,
            header("host"),
            uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/"),
            header("x-forwarded-for"),
        )
    }))
    .await
}

/// Backend echoing websocket text and binary frames on `/echo`.
pub async fn start_ws_echo_backend() -> SocketAddr {
    serve(Router::new().route(
        "/echo",
        get(|ws: WebSocketUpgrade| async move { ws.on_upgrade(echo_socket) }),
    ))
    .await
}

async fn echo_socket(mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        let reply = match message {
            Message::Text(text) => Message::Text(text),
            Message::Binary(data) => Message::Binary(data),
            Message::Close(_) => break,
            _ => continue,
        };
        if socket.send(reply).await.is_err() {
            break;
        }
    }
}

/// A running gateway bound to an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Arc<Shutdown>,
    pub resolver: Arc<Resolver>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
        self.resolver.stop();
    }
}

/// Activate the resolver named in `config` and serve it.
pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let resolver = ResolverRegistry::with_defaults()
        .activate(&config)
        .await
        .unwrap();
    start_gateway_with(config, resolver).await
}

/// Serve an already configured resolver.
pub async fn start_gateway_with(config: GatewayConfig, resolver: Resolver) -> TestGateway {
    let resolver = Arc::new(resolver);
    let shutdown = Arc::new(Shutdown::new());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = GatewayServer::new(config, Arc::clone(&resolver));
    let server_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        let _ = server.run(listener, &server_shutdown).await;
    });

    TestGateway {
        addr,
        shutdown,
        resolver,
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

type EventResult = Result<RuntimeEvent, DiscoveryError>;

/// In-memory container runtime driven by the test.
pub struct MemoryRuntime {
    pub containers: Mutex<Vec<Container>>,
    pub services: Mutex<Vec<Service>>,
    pub cluster: AtomicBool,
    pub failing: AtomicBool,
    events: Mutex<Option<mpsc::UnboundedReceiver<EventResult>>>,
    sender: mpsc::UnboundedSender<EventResult>,
}

impl MemoryRuntime {
    pub fn new() -> Arc<Self> {
        let (sender, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            containers: Mutex::new(Vec::new()),
            services: Mutex::new(Vec::new()),
            cluster: AtomicBool::new(false),
            failing: AtomicBool::new(false),
            events: Mutex::new(Some(rx)),
            sender,
        })
    }

    pub fn set_containers(&self, containers: Vec<Container>) {
        *self.containers.lock().unwrap() = containers;
    }

    pub fn set_services(&self, services: Vec<Service>) {
        *self.services.lock().unwrap() = services;
    }

    pub fn emit(&self, kind: &str, action: &str, actor: &str) {
        let _ = self.sender.send(Ok(RuntimeEvent::new(kind, action, actor)));
    }

    pub fn fail_stream(&self) {
        let _ = self
            .sender
            .send(Err(DiscoveryError::Unavailable("event stream closed".into())));
    }
}

#[async_trait]
impl RuntimeClient for MemoryRuntime {
    async fn list_containers(&self) -> Result<Vec<Container>, DiscoveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DiscoveryError::Unavailable("daemon unavailable".into()));
        }
        Ok(self.containers.lock().unwrap().clone())
    }

    async fn list_services(&self) -> Result<Vec<Service>, DiscoveryError> {
        Ok(self.services.lock().unwrap().clone())
    }

    async fn cluster_mode(&self) -> Result<bool, DiscoveryError> {
        Ok(self.cluster.load(Ordering::SeqCst))
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

/// A running container publishing `private` on host port `public`.
pub fn container(name: &str, private: u16, public: u16) -> Container {
    Container {
        id: format!("id-{}", name),
        names: vec![format!("/{}", name)],
        labels: Default::default(),
        ports: vec![PortBinding {
            private_port: private,
            public_port: Some(public),
            protocol: Protocol::Tcp,
        }],
    }
}
