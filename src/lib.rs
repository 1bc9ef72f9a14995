//! Host-based HTTP/WebSocket gateway for container stacks.
//!
//! Each request's `Host` is mapped to a backend address by the active
//! destination resolver (a static subnet table, or live Docker discovery
//! with blue/green stack selection) and then proxied or tunnelled there.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resolver;

pub use config::schema::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use resolver::{Destination, ResolutionError, Resolver, ResolverRegistry};
