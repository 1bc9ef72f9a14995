//! Plain-HTTP → HTTPS redirect policy for the plain listener when TLS is on.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use std::collections::HashSet;
use std::sync::Arc;

use crate::http::request::request_host;
use crate::http::transport::plain_text;
use crate::resolver::normalize_host;

/// Hosts allowed to stay on plain HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpsRedirect {
    plain_hosts: Arc<HashSet<String>>,
}

impl HttpsRedirect {
    pub fn new<I, S>(plain_hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            plain_hosts: Arc::new(
                plain_hosts
                    .into_iter()
                    .map(|h| normalize_host(h.as_ref()))
                    .collect(),
            ),
        }
    }

    pub fn allows_plain(&self, host: &str) -> bool {
        self.plain_hosts.contains(host)
    }

    /// `None` when the request may be served over plain HTTP.
    pub fn check<B>(&self, request: &Request<B>) -> Option<Response<Body>> {
        let host = normalize_host(&request_host(request).unwrap_or_default());
        if self.allows_plain(&host) {
            return None;
        }

        if request.method() != Method::GET && request.method() != Method::HEAD {
            return Some(plain_text(StatusCode::BAD_REQUEST, "Use HTTPS"));
        }

        let target = format!(
            "https://{}{}",
            host,
            request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/")
        );
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::FOUND;
        match HeaderValue::from_str(&target) {
            Ok(location) => {
                response.headers_mut().insert(header::LOCATION, location);
                Some(response)
            }
            Err(_) => Some(plain_text(StatusCode::BAD_REQUEST, "Use HTTPS")),
        }
    }
}

pub async fn https_redirect_middleware(
    State(policy): State<HttpsRedirect>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    match policy.check(&request) {
        Some(response) => response,
        None => next.run(request).await,
    }
}
