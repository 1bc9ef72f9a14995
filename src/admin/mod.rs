//! Admin API: read-only view of the gateway behind a bearer token.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Instant;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::resolver::Resolver;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub resolver: Arc<Resolver>,
    pub api_key: Arc<str>,
    pub started: Instant,
}

impl AdminState {
    pub fn new(resolver: Arc<Resolver>, api_key: &str) -> Self {
        Self {
            resolver,
            api_key: Arc::from(api_key),
            started: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/resolver", get(get_resolver))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
