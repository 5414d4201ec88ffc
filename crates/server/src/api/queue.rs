//! `/queue/join`, `/queue/status`, `/queue/heartbeat` (§6, §4.D) — device-
//! facing, no admin auth required.

use axum::Json;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use tracing::info;

use gatekeep_core::{DeviceId, EventId, QueueId, QueueStatusKind, UserId};
use gatekeep_queue::EnrollRequest;
use gatekeep_state::keys;

use crate::api::schemas::{HeartbeatRequest, JoinRequest, QueueStatusResponse, StatusQuery};
use crate::error::ApiError;
use crate::state::AppState;

/// Recommended client heartbeat cadence, in seconds. Half of the documented
/// default `heartbeat_timeout_seconds` (§3 `EventConfig`), so a client
/// polling at this rate comfortably clears the liveness deadline even on a
/// missed beat.
const NEXT_HEARTBEAT_SECONDS: i64 = 30;

/// `POST /queue/join`.
pub async fn join(
    State(state): State<AppState>,
    Json(req): Json<JoinRequest>,
) -> Result<Response, ApiError> {
    let event_id = EventId::new(req.event_id.clone());
    let device_id = DeviceId::new(req.device_id.clone());

    let entry = state
        .queue
        .enroll(
            event_id.clone(),
            device_id,
            EnrollRequest {
                user_id: req.user_id.map(UserId::new),
                priority_bucket: req.priority_bucket,
                metadata: req.metadata,
            },
        )
        .await
        .map_err(|err| {
            let err = gatekeep_core::GatekeepError::from(err);
            if matches!(err, gatekeep_core::GatekeepError::RateLimited { .. }) {
                state.metrics.record_rate_limited(event_id.as_str());
            }
            err
        })?;

    state.metrics.record_enrollment(event_id.as_str());
    info!(%event_id, queue_id = %entry.queue_id, "queue join handled");

    let view = state
        .queue
        .status(&entry.queue_id)
        .await
        .map_err(gatekeep_core::GatekeepError::from)?;
    Ok((axum::http::StatusCode::OK, Json(QueueStatusResponse::from(view))).into_response())
}

/// `GET /queue/status?queue_id=...`.
pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<QueueStatusResponse>, ApiError> {
    let queue_id = QueueId::new(query.queue_id);
    let view = state
        .queue
        .status(&queue_id)
        .await
        .map_err(gatekeep_core::GatekeepError::from)?;
    Ok(Json(QueueStatusResponse::from(view)))
}

/// `POST /queue/heartbeat` — extends liveness and, once admitted, hands back
/// the admission token stashed by the release controller (§4.D Heartbeat).
pub async fn heartbeat(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<QueueStatusResponse>, ApiError> {
    let queue_id = QueueId::new(req.queue_id);
    let view = state
        .queue
        .heartbeat(&queue_id)
        .await
        .map_err(gatekeep_core::GatekeepError::from)?;

    let mut response = QueueStatusResponse::from(view.clone());
    response.next_heartbeat_seconds = Some(NEXT_HEARTBEAT_SECONDS);
    if view.status == QueueStatusKind::Admitted {
        response.admission_token = state
            .store
            .get_string(&keys::issued_token(queue_id.as_str()))
            .await
            .map_err(|e| gatekeep_core::GatekeepError::StoreUnavailable(e.to_string()))?;
    }

    Ok(Json(response))
}
