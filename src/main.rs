//! stack-gateway
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ http server ──▶ dispatcher ──▶ resolver (subnet | docker)
//!                                  │                ▲
//!                                  │                │ atomic table swap
//!                                  │          docker event watcher ◀── Docker API
//!                                  │
//!                    ┌─────────────┴─────────────┐
//!                    ▼                           ▼
//!            websocket tunnel            transport (errors → 502)
//!                    │                           │
//!                    └──────────▶ Backend ◀──────┘
//! ```

use clap::Parser;

use stack_gateway::config::Args;
use stack_gateway::lifecycle::startup;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    startup::run(Args::parse()).await
}
