//! Metrics middleware and the caller identity extractor.

use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{request::Parts, Request},
    middleware::Next,
    response::Response,
};
use std::future::Future;
use std::time::Instant;
use transmute_core::conversion::wire::CALLER_HEADER;

use crate::metrics::{
    normalize_path, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION,
};

/// Caller used when a request carries no `X-Caller-Id`.
pub const ANONYMOUS_CALLER: &str = "anonymous";

/// Longest caller id accepted from the header.
const MAX_CALLER_LEN: usize = 128;

/// Metrics middleware that tracks HTTP request duration and counts.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();

    let response = next.run(request).await;

    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// Identity of the caller, taken from the `X-Caller-Id` header.
///
/// Missing, blank, non-ASCII or overlong values fall back to
/// [`ANONYMOUS_CALLER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerId(pub String);

impl CallerId {
    fn from_header(value: Option<&str>) -> Self {
        let caller = value
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= MAX_CALLER_LEN)
            .filter(|v| v.chars().all(|c| c.is_ascii_graphic()))
            .unwrap_or(ANONYMOUS_CALLER);
        Self(caller.to_string())
    }
}

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let header = parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok());
        std::future::ready(Ok(CallerId::from_header(header)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    async fn whoami(CallerId(caller): CallerId) -> String {
        caller
    }

    fn router() -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn(metrics_middleware))
    }

    async fn caller_for(header: Option<&str>) -> String {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(value) = header {
            builder = builder.header(CALLER_HEADER, value);
        }
        let response = router()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_caller_from_header() {
        assert_eq!(caller_for(Some("alice")).await, "alice");
        assert_eq!(caller_for(Some("  bob  ")).await, "bob");
    }

    #[tokio::test]
    async fn test_missing_caller_is_anonymous() {
        assert_eq!(caller_for(None).await, ANONYMOUS_CALLER);
        assert_eq!(caller_for(Some("   ")).await, ANONYMOUS_CALLER);
    }

    #[test]
    fn test_overlong_or_odd_caller_is_anonymous() {
        let long = "x".repeat(MAX_CALLER_LEN + 1);
        assert_eq!(CallerId::from_header(Some(&long)).0, ANONYMOUS_CALLER);
        assert_eq!(CallerId::from_header(Some("two words")).0, ANONYMOUS_CALLER);
    }

    #[tokio::test]
    async fn test_metrics_middleware_counts_requests() {
        let before = HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/whoami", "200"])
            .get();
        caller_for(Some("carol")).await;
        let after = HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/whoami", "200"])
            .get();
        assert!(after > before);
    }
}
