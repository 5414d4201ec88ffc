//! `POST /admission/verify` (§8 scenario 1: "direct token verification").
//!
//! Backend services are expected to verify admission tokens offline against
//! the shared secret (§2: "Backend services verify tokens directly against
//! B without traversing the service"); this endpoint exists as a
//! convenience for callers that would rather make one request than
//! vendor the HS256 codec themselves.

use axum::Json;
use axum::extract::State;

use gatekeep_core::EventId;
use gatekeep_token::TokenMetadataStore;

use crate::api::schemas::{VerifyRequest, VerifyResponse};
use crate::state::AppState;

/// `POST /admission/verify`.
///
/// Unlike every other error path in this service, a failed verification is
/// not an [`crate::error::ApiError`] — an invalid token is an expected,
/// routine outcome for this endpoint, not a fault. The response is always
/// `200 OK`; callers branch on the `valid` field.
pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Json<VerifyResponse> {
    let expected_event = req.event_id.map(EventId::new);
    let metadata = TokenMetadataStore::new(state.store.as_ref());

    match state
        .token_codec
        .verify(&req.token, expected_event.as_ref(), Some(&metadata))
        .await
    {
        Ok(verified) => {
            state
                .metrics
                .record_token_verify(verified.payload.event_id.as_str(), true);
            Json(VerifyResponse {
                valid: true,
                reason: None,
                event_id: Some(verified.payload.event_id.to_string()),
                device_id: Some(verified.payload.device_id.to_string()),
                user_id: Some(verified.payload.user_id.to_string()),
                queue_id: Some(verified.payload.queue_id.to_string()),
                expires_at: Some(verified.payload.expires_at),
            })
        }
        Err(err) => {
            if let Some(event_id) = &expected_event {
                state.metrics.record_token_verify(event_id.as_str(), false);
            }
            Json(VerifyResponse {
                valid: false,
                reason: Some(err.to_string()),
                event_id: None,
                device_id: None,
                user_id: None,
                queue_id: None,
                expires_at: None,
            })
        }
    }
}
