//! Admin auth middleware (§6: "Admin auth: header `X-API-Key` or
//! `Authorization: Bearer`, compared against the configured admin key in
//! constant time").

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tower::{Layer, Service};

/// Tower layer that gates a router subtree behind the admin API key.
#[derive(Clone)]
pub struct AdminAuthLayer {
    expected: SecretString,
}

impl AdminAuthLayer {
    #[must_use]
    pub fn new(expected: SecretString) -> Self {
        Self { expected }
    }
}

impl<S> Layer<S> for AdminAuthLayer {
    type Service = AdminAuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdminAuthMiddleware {
            inner,
            expected: self.expected.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AdminAuthMiddleware<S> {
    inner: S,
    expected: SecretString,
}

impl<S> Service<Request<Body>> for AdminAuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let expected = self.expected.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let presented = extract_key(&req);
            if !matches_key(presented.as_deref(), &expected) {
                return Ok(unauthorized());
            }
            inner.call(req).await
        })
    }
}

fn extract_key(req: &Request<Body>) -> Option<String> {
    if let Some(value) = req.headers().get("x-api-key") {
        return value.to_str().ok().map(str::to_owned);
    }
    let header = req.headers().get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    header.strip_prefix("Bearer ").map(str::to_owned)
}

fn matches_key(presented: Option<&str>, expected: &SecretString) -> bool {
    let Some(presented) = presented else {
        return false;
    };
    let expected = expected.expose_secret().as_bytes();
    let presented = presented.as_bytes();
    presented.len() == expected.len() && bool::from(presented.ct_eq(expected))
}

fn unauthorized() -> Response {
    let body = serde_json::json!({
        "error": "unauthorized",
        "kind": "unauthorized",
    });
    (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(value: &str) -> SecretString {
        SecretString::from(value.to_owned())
    }

    #[test]
    fn accepts_matching_key() {
        assert!(matches_key(Some("secret"), &key("secret")));
    }

    #[test]
    fn rejects_missing_key() {
        assert!(!matches_key(None, &key("secret")));
    }

    #[test]
    fn rejects_wrong_key() {
        assert!(!matches_key(Some("wrong"), &key("secret")));
    }

    #[test]
    fn rejects_different_length_key() {
        assert!(!matches_key(Some("s"), &key("secret")));
    }

    #[test]
    fn extracts_bearer_token() {
        let req = Request::builder()
            .header(axum::http::header::AUTHORIZATION, "Bearer abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_key(&req).as_deref(), Some("abc123"));
    }

    #[test]
    fn extracts_api_key_header_over_bearer() {
        let req = Request::builder()
            .header("x-api-key", "from-header")
            .header(axum::http::header::AUTHORIZATION, "Bearer ignored")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_key(&req).as_deref(), Some("from-header"));
    }
}
