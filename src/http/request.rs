//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) when the client sent none
//! - Extract the request host
//! - Prepare a request for forwarding to its destination
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The original `Host` header is kept so virtual hosts keep working
//! - Hop-by-hop headers never cross the gateway

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::uri::{Authority, Scheme};
use axum::http::{Request, Uri};
use std::net::SocketAddr;
use std::str::FromStr;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use uuid::Uuid;

use crate::resolver::Destination;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers that describe a single connection rather than the message.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

/// UUID v4 request ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Layer that assigns `x-request-id` to requests missing one.
pub fn set_request_id_layer() -> SetRequestIdLayer<UuidRequestId> {
    SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), UuidRequestId)
}

/// Layer that copies the request's `x-request-id` onto its response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID))
}

pub trait RequestIdExt {
    /// The request id, or `"unknown"` before the id layer ran.
    fn request_id(&self) -> &str;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> &str {
        self.headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    }
}

/// `host[:port]` the client addressed: the `Host` header, else the URI authority.
pub fn request_host<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()))
}

/// Remove hop-by-hop headers, including any named by `Connection`.
///
/// `Upgrade` is removed too; tunnelled requests never take this path.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_str(name.trim()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove(header::UPGRADE);
}

/// Append the peer address to `X-Forwarded-For`.
pub fn append_forwarded_for(headers: &mut HeaderMap, peer: SocketAddr) {
    let peer_ip = peer.ip().to_string();
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.is_empty() => format!("{}, {}", prior, peer_ip),
        _ => peer_ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Point `uri` at `destination` over plain HTTP, keeping path and query.
pub fn destination_uri(uri: &Uri, destination: &Destination) -> Result<Uri, axum::http::Error> {
    let mut parts = uri.clone().into_parts();
    parts.scheme = Some(Scheme::HTTP);
    parts.authority = Some(Authority::from_str(&destination.to_string())?);
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some("/".parse()?);
    }
    Ok(Uri::from_parts(parts)?)
}

/// Rewrite a client request into the request sent to `destination`.
pub fn prepare_forward<B>(
    mut request: Request<B>,
    destination: &Destination,
    peer: SocketAddr,
) -> Result<Request<B>, axum::http::Error> {
    let uri = destination_uri(request.uri(), destination)?;
    *request.uri_mut() = uri;
    strip_hop_by_hop(request.headers_mut());
    append_forwarded_for(request.headers_mut(), peer);
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "192.0.2.7:51000".parse().unwrap()
    }

    #[test]
    fn test_request_host_prefers_header() {
        let req = Request::builder()
            .uri("http://other.example/x")
            .header("host", "web.site.com:8080")
            .body(())
            .unwrap();
        assert_eq!(request_host(&req).as_deref(), Some("web.site.com:8080"));

        let req = Request::builder().uri("http://other.example/x").body(()).unwrap();
        assert_eq!(request_host(&req).as_deref(), Some("other.example"));

        let req = Request::builder().uri("/x").body(()).unwrap();
        assert_eq!(request_host(&req), None);
    }

    #[test]
    fn test_prepare_forward() {
        let req = Request::builder()
            .uri("/api/items?page=2")
            .header("host", "web.site.com")
            .header("connection", "keep-alive, x-private")
            .header("keep-alive", "timeout=5")
            .header("x-private", "secret")
            .header("x-forwarded-for", "198.51.100.1")
            .header("accept", "application/json")
            .body(())
            .unwrap();

        let out = prepare_forward(req, &Destination::new("10.0.0.1", 32768), peer()).unwrap();
        assert_eq!(out.uri().to_string(), "http://10.0.0.1:32768/api/items?page=2");
        assert_eq!(out.headers()["host"], "web.site.com");
        assert_eq!(out.headers()["x-forwarded-for"], "198.51.100.1, 192.0.2.7");
        assert_eq!(out.headers()["accept"], "application/json");
        assert!(out.headers().get("connection").is_none());
        assert!(out.headers().get("keep-alive").is_none());
        assert!(out.headers().get("x-private").is_none());
    }

    #[test]
    fn test_destination_uri_defaults_path() {
        let uri: Uri = "http://web.site.com".parse().unwrap();
        let out = destination_uri(&uri, &Destination::new("web", 80)).unwrap();
        assert_eq!(out.to_string(), "http://web:80/");
    }

    #[test]
    fn test_uuid_request_ids_are_unique() {
        let req = Request::new(());
        let mut make = UuidRequestId;
        let a = make.make_request_id(&req).unwrap();
        let b = make.make_request_id(&req).unwrap();
        assert_ne!(a.header_value(), b.header_value());
        assert_eq!(a.header_value().len(), 36);
    }
}
