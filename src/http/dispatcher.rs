//! Per-request dispatch: resolve, then tunnel or forward.

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, Response, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceExt;

use crate::config::InspectConfig;
use crate::http::request::{prepare_forward, request_host, RequestIdExt};
use crate::http::transport::{plain_text, ErrorHandlingTransport, HttpClient};
use crate::http::{inspect, websocket};
use crate::observability::metrics;
use crate::resolver::Resolver;

/// Shared by every request task. Resolver state is read-only here.
#[derive(Clone)]
pub struct Dispatcher {
    resolver: Arc<Resolver>,
    transport: ErrorHandlingTransport<HttpClient>,
    inspect: InspectConfig,
}

impl Dispatcher {
    pub fn new(resolver: Arc<Resolver>, inspect: InspectConfig) -> Self {
        Self {
            resolver,
            transport: ErrorHandlingTransport::http(),
            inspect,
        }
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    pub async fn handle(&self, peer: SocketAddr, request: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let method = request.method().to_string();
        let request_id = request.request_id().to_string();

        let Some(host) = request_host(&request) else {
            tracing::debug!(request_id = %request_id, "Request without host");
            metrics::record_request(&method, 400, "http", start.elapsed());
            return plain_text(StatusCode::BAD_REQUEST, "Missing Host header");
        };

        let destination = match self.resolver.resolve(&host) {
            Ok(destination) => destination,
            Err(e) => {
                tracing::info!(request_id = %request_id, host = %host, error = %e, "No destination for request");
                metrics::record_request(&method, 502, "http", start.elapsed());
                return plain_text(StatusCode::BAD_GATEWAY, e.to_string());
            }
        };

        if websocket::is_websocket_upgrade(request.headers()) {
            tracing::debug!(request_id = %request_id, host = %host, destination = %destination, "Tunnelling websocket");
            let response = websocket::tunnel(request, &destination).await;
            metrics::record_request(&method, response.status().as_u16(), "tunnel", start.elapsed());
            return response;
        }

        tracing::debug!(
            request_id = %request_id,
            host = %host,
            destination = %destination,
            path = %request.uri().path(),
            "Proxying request"
        );

        let request = match prepare_forward(request, &destination, peer) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(request_id = %request_id, destination = %destination, error = %e, "Failed to build upstream request");
                metrics::record_request(&method, 502, "http", start.elapsed());
                return plain_text(StatusCode::BAD_GATEWAY, e.to_string());
            }
        };

        let response = if self.inspect.enabled {
            inspect::exchange(self.transport.clone(), request, self.inspect.max_logged_body_bytes).await
        } else {
            match self.transport.clone().oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            }
        };

        metrics::record_request(&method, response.status().as_u16(), "http", start.elapsed());
        response
    }
}

/// Axum entry point for every proxied path.
pub async fn proxy_handler(
    State(dispatcher): State<Dispatcher>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    dispatcher.handle(peer, request).await
}
