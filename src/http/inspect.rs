//! Traffic inspection.
//!
//! Buffers a full exchange so it can be logged. Bodies are truncated in the
//! log only; the client always receives the backend's bytes unchanged.

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, Response, StatusCode};
use std::convert::Infallible;
use tower::{Service, ServiceExt};

use crate::http::transport::plain_text;

/// Forward `request` through `transport`, logging both directions.
pub async fn exchange<S>(transport: S, request: Request<Body>, max_logged: usize) -> Response<Body>
where
    S: Service<Request<Body>, Response = Response<Body>, Error = Infallible>,
{
    let (parts, body) = request.into_parts();
    let request_body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body for inspection");
            return plain_text(StatusCode::BAD_REQUEST, "Failed to read request body");
        }
    };

    tracing::info!(
        method = %parts.method,
        uri = %parts.uri,
        version = ?parts.version,
        headers = %format_headers(&parts.headers),
        body = %preview(&request_body, max_logged),
        "Inspect request"
    );

    let url = parts.uri.to_string();
    let request = Request::from_parts(parts, Body::from(request_body));
    let response = match transport.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    let (parts, body) = response.into_parts();
    let response_body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(status = %parts.status, error = %e, "Backend response body failed during inspection");
            return crate::http::transport::bad_gateway(&url, &e);
        }
    };

    tracing::info!(
        status = %parts.status,
        headers = %format_headers(&parts.headers),
        body = %preview(&response_body, max_logged),
        "Inspect response"
    );

    Response::from_parts(parts, Body::from(response_body))
}

fn format_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes())))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Lossy text of at most `limit` bytes of `body`.
pub fn preview(body: &Bytes, limit: usize) -> String {
    if body.len() <= limit {
        return String::from_utf8_lossy(body).into_owned();
    }
    format!(
        "{}... ({} more bytes)",
        String::from_utf8_lossy(&body[..limit]),
        body.len() - limit
    )
}
