//! WebSocket tunnelling.
//!
//! # Responsibilities
//! - Detect WebSocket upgrade requests
//! - Replay the handshake to the backend over a fresh connection
//! - Take over both connections and relay raw bytes
//!
//! # Data Flow
//! ```text
//! Client ←──── raw bytes ────→ Gateway ←──── raw bytes ────→ Backend
//! ```
//!
//! # Design Decisions
//! - Byte-level relay: frames are never parsed
//! - The first direction to finish ends the tunnel
//! - Non-101 backend answers are relayed as ordinary responses

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::http::transport::{bad_gateway, plain_text};
use crate::observability::metrics;
use crate::resolver::Destination;

/// Whether the request asks to switch to the WebSocket protocol.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains("upgrade"));
    let upgrade_websocket = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    connection_upgrade && upgrade_websocket
}

/// Tunnel an upgrade request to `destination`.
///
/// Dial failures answer 500 before anything is taken over.
pub async fn tunnel(mut request: Request<Body>, destination: &Destination) -> Response<Body> {
    let stream = match TcpStream::connect((destination.host.as_str(), destination.port)).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(destination = %destination, error = %e, "Failed to dial websocket backend");
            return plain_text(StatusCode::INTERNAL_SERVER_ERROR, "Error contacting backend server.");
        }
    };

    let (mut sender, connection) = match hyper::client::conn::http1::handshake(TokioIo::new(stream)).await {
        Ok(pair) => pair,
        Err(e) => {
            tracing::warn!(destination = %destination, error = %e, "Websocket backend handshake failed");
            return plain_text(StatusCode::INTERNAL_SERVER_ERROR, "Error contacting backend server.");
        }
    };
    tokio::spawn(async move {
        if let Err(e) = connection.with_upgrades().await {
            tracing::debug!(error = %e, "Websocket backend connection closed with error");
        }
    });

    let client_upgrade = hyper::upgrade::on(&mut request);
    let url = format!("http://{}{}", destination, path_and_query(request.uri()));

    // The backend sees the original request line and headers.
    let (mut parts, body) = request.into_parts();
    parts.uri = origin_form(&parts.uri);
    let outbound = Request::from_parts(parts, body);

    let mut response = match sender.send_request(outbound).await {
        Ok(response) => response,
        Err(e) => return bad_gateway(&url, &e),
    };

    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        tracing::debug!(status = %response.status(), url = %url, "Backend declined websocket upgrade");
        let (parts, body) = response.into_parts();
        return Response::from_parts(parts, Body::new(body));
    }

    let backend_upgrade = hyper::upgrade::on(&mut response);
    let destination = destination.to_string();
    tokio::spawn(async move {
        let (client, backend) = match tokio::try_join!(client_upgrade, backend_upgrade) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(destination = %destination, error = %e, "Websocket takeover failed");
                return;
            }
        };
        metrics::tunnel_opened();
        let ended_by = relay(TokioIo::new(client), TokioIo::new(backend)).await;
        metrics::tunnel_closed();
        tracing::debug!(destination = %destination, ended_by = ?ended_by, "Websocket tunnel closed");
    });

    let (parts, _) = response.into_parts();
    Response::from_parts(parts, Body::empty())
}

/// Side whose read half ended the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    Client,
    Backend,
}

/// Copy bytes both ways until either direction ends, then close both.
pub async fn relay<C, B>(client: C, backend: B) -> (RelayEnd, io::Result<u64>)
where
    C: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut backend_read, mut backend_write) = tokio::io::split(backend);

    let outcome = tokio::select! {
        copied = tokio::io::copy(&mut client_read, &mut backend_write) => (RelayEnd::Client, copied),
        copied = tokio::io::copy(&mut backend_read, &mut client_write) => (RelayEnd::Backend, copied),
    };

    let _ = client_write.shutdown().await;
    let _ = backend_write.shutdown().await;
    outcome
}

fn path_and_query(uri: &Uri) -> &str {
    uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
}

fn origin_form(uri: &Uri) -> Uri {
    path_and_query(uri)
        .parse()
        .unwrap_or_else(|_| Uri::from_static("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(
                header::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                v.parse().unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_detects_upgrade_any_case() {
        assert!(is_websocket_upgrade(&headers(&[
            ("connection", "Upgrade"),
            ("upgrade", "websocket")
        ])));
        assert!(is_websocket_upgrade(&headers(&[
            ("connection", "keep-alive, UPGRADE"),
            ("upgrade", "WebSocket")
        ])));
    }

    #[test]
    fn test_requires_both_headers() {
        assert!(!is_websocket_upgrade(&headers(&[("upgrade", "websocket")])));
        assert!(!is_websocket_upgrade(&headers(&[("connection", "upgrade")])));
        assert!(!is_websocket_upgrade(&headers(&[
            ("connection", "upgrade"),
            ("upgrade", "h2c")
        ])));
    }

    #[tokio::test]
    async fn test_dial_failure_is_500() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let request = Request::builder()
            .uri("/socket")
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .body(Body::empty())
            .unwrap();

        let response = tunnel(request, &Destination::new("127.0.0.1", port)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Error contacting backend server.");
    }

    #[tokio::test]
    async fn test_relay_copies_both_ways_and_closes_on_first_end() {
        let (client, mut client_peer) = tokio::io::duplex(64);
        let (backend, mut backend_peer) = tokio::io::duplex(64);
        let relay = tokio::spawn(relay(client, backend));

        client_peer.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        backend_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        backend_peer.write_all(b"pong").await.unwrap();
        client_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        // Client hangs up: the relay ends and the backend sees EOF.
        drop(client_peer);
        let (ended_by, copied) = relay.await.unwrap();
        assert_eq!(ended_by, RelayEnd::Client);
        assert_eq!(copied.unwrap(), 4);

        let mut rest = Vec::new();
        backend_peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}
