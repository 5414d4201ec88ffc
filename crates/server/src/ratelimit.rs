//! Per-client-IP HTTP rate limit middleware (§6: "60 requests per client IP
//! per minute, returning 429 on excess"), layered independently of the
//! per-`(device_id, event_id)` enrollment throttle enforced inside
//! `gatekeep-queue` (§4.C).

use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use gatekeep_ratelimit::{RateLimitDecision, RateLimiter};
use gatekeep_state::StoreAdapter;
use tower::{Layer, Service};
use tracing::warn;

const HTTP_RATE_LIMIT: u64 = 60;
const HTTP_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Tower layer enforcing the per-IP HTTP request budget.
#[derive(Clone)]
pub struct IpRateLimitLayer {
    store: Arc<dyn StoreAdapter>,
}

impl IpRateLimitLayer {
    #[must_use]
    pub fn new(store: Arc<dyn StoreAdapter>) -> Self {
        Self { store }
    }
}

impl<S> Layer<S> for IpRateLimitLayer {
    type Service = IpRateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IpRateLimitMiddleware {
            inner,
            store: Arc::clone(&self.store),
        }
    }
}

#[derive(Clone)]
pub struct IpRateLimitMiddleware<S> {
    inner: S,
    store: Arc<dyn StoreAdapter>,
}

impl<S> Service<Request<Body>> for IpRateLimitMiddleware<S>
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
        let store = Arc::clone(&self.store);
        let mut inner = self.inner.clone();
        let client_ip = client_ip(&req);

        Box::pin(async move {
            let limiter = RateLimiter::new(store.as_ref());
            let key = format!("http:ratelimit:{client_ip}");
            match limiter
                .check_and_increment(&key, HTTP_RATE_LIMIT, HTTP_RATE_WINDOW)
                .await
            {
                Ok(RateLimitDecision::Allowed) => inner.call(req).await,
                Ok(RateLimitDecision::Limited {
                    retry_after_seconds,
                }) => Ok(rate_limited(retry_after_seconds)),
                Err(err) => {
                    warn!(%client_ip, error = %err, "http rate limiter unavailable, allowing request");
                    inner.call(req).await
                }
            }
        })
    }
}

fn client_ip(req: &Request<Body>) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
    {
        return forwarded.trim().to_owned();
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

fn rate_limited(retry_after_seconds: u64) -> Response {
    let body = serde_json::json!({
        "error": format!("rate limited, retry after {retry_after_seconds}s"),
        "kind": "rate_limited",
    });
    let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, retry_after_seconds.into());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.5, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req), "203.0.113.5");
    }

    #[test]
    fn client_ip_falls_back_to_unknown() {
        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_ip(&req), "unknown");
    }
}
