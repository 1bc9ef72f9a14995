//! Startup orchestration.
//!
//! # Responsibilities
//! - Load, override and validate configuration
//! - Initialize subsystems in dependency order
//! - Bind listeners and begin accepting traffic
//! - Stop background work once the listeners have drained
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::admin;
use crate::config::{read_config, validate_config, Args, ConfigError, GatewayConfig};
use crate::http::GatewayServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::{logging, metrics};
use crate::resolver::ResolverRegistry;

/// File values, then command-line and environment overrides, then validation.
pub fn resolve_config(args: &Args) -> Result<GatewayConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => GatewayConfig::default(),
    };
    args.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Run the gateway until SIGINT/SIGTERM.
pub async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Err(e.into());
        }
    };

    logging::init_logging(&config.observability, args.log_level());
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        resolver = %config.resolver.name,
        bind_address = %config.listener.bind_address,
        tls = config.tls.is_some(),
        "stack-gateway starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let resolver = match ResolverRegistry::with_defaults().activate(&config).await {
        Ok(resolver) => Arc::new(resolver),
        Err(e) => {
            tracing::error!(error = %e, "Failed to configure destination resolver");
            return Err(e.into());
        }
    };

    let shutdown = Arc::new(Shutdown::new());
    signals::spawn_signal_handler(Arc::clone(&shutdown));

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let router = admin::setup_admin_router(admin::AdminState::new(
            Arc::clone(&resolver),
            &config.admin.api_key,
        ));
        let signalled = shutdown.signalled();
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(signalled)
                .await
            {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = GatewayServer::new(config, Arc::clone(&resolver));
    let result = server.run(listener, &shutdown).await;

    resolver.stop();
    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}
