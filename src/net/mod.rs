//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → plain listener (axum::serve)
//!     → tls.rs (optional TLS listener via axum-server/rustls)
//!     → Hand off to HTTP layer
//!
//! Outbound:
//!     gateway.rs → address published container ports are reached on
//! ```
//!
//! # Design Decisions
//! - TLS is optional and serves the same dispatcher
//! - Gateway detection never fails; it falls back to loopback

pub mod gateway;
pub mod tls;
