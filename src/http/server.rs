//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router that hands every request to the dispatcher
//! - Wire up middleware (tracing, request ID, HTTPS redirect)
//! - Serve the plain listener and, when configured, the TLS listener
//! - Drain both on shutdown

use axum::{body::Body, http::Request, middleware, routing::any, Router};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::http::dispatcher::{proxy_handler, Dispatcher};
use crate::http::redirect::{https_redirect_middleware, HttpsRedirect};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::lifecycle::Shutdown;
use crate::net::tls;
use crate::resolver::Resolver;

/// Gateway HTTP server.
pub struct GatewayServer {
    config: GatewayConfig,
    dispatcher: Dispatcher,
}

impl GatewayServer {
    /// Create a server dispatching through an already configured resolver.
    pub fn new(config: GatewayConfig, resolver: Arc<Resolver>) -> Self {
        let dispatcher = Dispatcher::new(resolver, config.inspect.clone());
        Self { config, dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Router serving the proxy on every path.
    pub fn proxy_router(&self) -> Router {
        Self::with_layers(self.proxy_routes())
    }

    /// Router for the plain listener: redirects to HTTPS when TLS is on.
    pub fn plain_router(&self) -> Router {
        let routes = self.proxy_routes();
        let routes = match &self.config.tls {
            Some(tls) => routes.layer(middleware::from_fn_with_state(
                HttpsRedirect::new(&tls.http_hosts),
                https_redirect_middleware,
            )),
            None => routes,
        };
        Self::with_layers(routes)
    }

    fn proxy_routes(&self) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(self.dispatcher.clone())
    }

    fn with_layers(routes: Router) -> Router {
        routes
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request.request_id(),
                )
            }))
            .layer(set_request_id_layer())
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;

        let tls_server = match &self.config.tls {
            Some(tls_config) => {
                let rustls = tls::from_config(tls_config).await?;
                let bind: SocketAddr = tls_config
                    .bind_address
                    .parse()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                let handle = axum_server::Handle::new();
                let app = self
                    .proxy_router()
                    .into_make_service_with_connect_info::<SocketAddr>();
                let server = axum_server::bind_rustls(bind, rustls).handle(handle.clone());

                let signalled = shutdown.signalled();
                tokio::spawn(async move {
                    signalled.await;
                    handle.graceful_shutdown(None);
                });

                tracing::info!(address = %bind, "HTTPS server starting");
                Some(tokio::spawn(async move { server.serve(app).await }))
            }
            None => None,
        };

        tracing::info!(
            address = %addr,
            resolver = self.dispatcher.resolver().name(),
            "HTTP server starting"
        );

        let app = self
            .plain_router()
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.signalled())
            .await?;

        if let Some(task) = tls_server {
            task.await.map_err(io::Error::other)??;
            tracing::info!("HTTPS server stopped");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
