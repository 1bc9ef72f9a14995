//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, tracing, HTTPS redirect)
//!     → dispatcher.rs (resolve destination)
//!         → websocket.rs (upgrade: raw byte tunnel)
//!         → request.rs (rewrite URI, strip hop-by-hop, X-Forwarded-For)
//!         → [inspect.rs] (optional full-exchange logging)
//!         → transport.rs (client; errors become padded 502)
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod inspect;
pub mod redirect;
pub mod request;
pub mod server;
pub mod transport;
pub mod websocket;

pub use dispatcher::Dispatcher;
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::GatewayServer;
pub use transport::ErrorHandlingTransport;
