use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::resolver::ResolverSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub resolver: &'static str,
    pub uptime_secs: u64,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        resolver: state.resolver.name(),
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

pub async fn get_resolver(State(state): State<AdminState>) -> Json<ResolverSnapshot> {
    Json(state.resolver.snapshot())
}
