//! Translates [`GatekeepError`] into the §7 HTTP status taxonomy.
//!
//! This is the one place in the workspace that knows both the error
//! taxonomy and HTTP — `gatekeep-core` has no `axum` dependency, so the
//! `IntoResponse` impl lives here rather than alongside the enum itself.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gatekeep_core::{GatekeepError, random_urlsafe_token};
use serde::Serialize;
use tracing::error;

/// The body returned on every non-2xx response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
}

/// Wraps [`GatekeepError`] so it can implement the foreign `IntoResponse`
/// trait (orphan rule forbids implementing it directly on the `gatekeep-core`
/// type from this crate).
pub struct ApiError(pub GatekeepError);

impl From<GatekeepError> for ApiError {
    fn from(err: GatekeepError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let kind = err.kind();

        // Internal errors are never surfaced verbatim; log with a
        // correlation ID the client can quote back to support (§7
        // Propagation policy).
        if matches!(err, GatekeepError::Internal(_)) {
            let correlation_id = random_urlsafe_token();
            error!(correlation_id, error = %err, "internal error");
            let body = ErrorBody {
                error: "an internal error occurred".to_owned(),
                kind,
                correlation_id: Some(correlation_id),
            };
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
        }

        let status = match &err {
            GatekeepError::Validation(_) => StatusCode::BAD_REQUEST,
            GatekeepError::NotFound(_) => StatusCode::NOT_FOUND,
            GatekeepError::Gone(_) => StatusCode::GONE,
            GatekeepError::Conflict(_) => StatusCode::CONFLICT,
            GatekeepError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatekeepError::QueueDisabled { .. }
            | GatekeepError::QueueFull { .. }
            | GatekeepError::Paused { .. }
            | GatekeepError::CapacityReached { .. }
            | GatekeepError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatekeepError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatekeepError::Internal(_) => unreachable!("handled above"),
        };

        let body = ErrorBody {
            error: err.to_string(),
            kind,
            correlation_id: None,
        };
        let mut response = (status, Json(body)).into_response();

        if let GatekeepError::RateLimited {
            retry_after_seconds,
        } = err
        {
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                retry_after_seconds.into(),
            );
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_never_leak_their_message() {
        let response = ApiError(GatekeepError::Internal("leaky secret detail".into()))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rate_limited_sets_retry_after_header() {
        let response = ApiError(GatekeepError::RateLimited {
            retry_after_seconds: 42,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(axum::http::header::RETRY_AFTER)
                .unwrap(),
            "42"
        );
    }

    #[test]
    fn not_found_maps_to_404() {
        let response = ApiError(GatekeepError::NotFound("x".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
