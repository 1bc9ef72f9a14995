//! Outbound HTTP transport that never fails.
//!
//! Every transport error (refused connection, DNS failure, reset) becomes a
//! synthesized `502 Bad Gateway` so the client always gets a well-formed
//! response.

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, StatusCode};
use futures_util::future::BoxFuture;
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::task::{Context, Poll};
use tower::{Service, ServiceExt};

/// Minimum body length of synthesized errors. Browsers replace shorter
/// error bodies with their own pages.
pub const MIN_ERROR_BODY_BYTES: usize = 512;

pub type HttpClient = Client<HttpConnector, Body>;

pub fn http_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Wraps a client service, turning its errors into 502 responses.
#[derive(Clone)]
pub struct ErrorHandlingTransport<S> {
    inner: S,
}

impl<S> ErrorHandlingTransport<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl ErrorHandlingTransport<HttpClient> {
    pub fn http() -> Self {
        Self::new(http_client())
    }
}

impl<S> Service<Request<Body>> for ErrorHandlingTransport<S>
where
    S: Service<Request<Body>, Response = Response<Incoming>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: StdError + Send + Sync + 'static,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response<Body>, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness of the inner service is awaited per call below.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let inner = self.inner.clone();
        let url = request.uri().to_string();
        Box::pin(async move {
            match inner.oneshot(request).await {
                Ok(response) => {
                    let (mut parts, body) = response.into_parts();
                    crate::http::request::strip_hop_by_hop(&mut parts.headers);
                    Ok(Response::from_parts(parts, Body::new(body)))
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %error_chain(&e), "Backend transport error");
                    Ok(bad_gateway(&url, &e))
                }
            }
        })
    }
}

/// `Display` of an error followed by each of its sources.
pub fn error_chain(error: &dyn StdError) -> String {
    let mut chain = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

/// Synthesized 502 for a failed request to `url`.
pub fn bad_gateway(url: &str, error: &dyn StdError) -> Response<Body> {
    plain_text(
        StatusCode::BAD_GATEWAY,
        padded(format!("Proxy error when accessing {}\n{}", url, error_chain(error))),
    )
}

/// Pad `body` with spaces up to [`MIN_ERROR_BODY_BYTES`].
pub fn padded(mut body: String) -> String {
    if body.len() < MIN_ERROR_BODY_BYTES {
        let fill = MIN_ERROR_BODY_BYTES - body.len();
        body.extend(std::iter::repeat(' ').take(fill));
    }
    body
}

/// A `text/plain` response.
pub fn plain_text(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
