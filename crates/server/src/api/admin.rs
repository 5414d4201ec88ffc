//! `/admin/release`, `/admin/pause`, `/admin/config`, `/admin/metrics` (§6,
//! §4.E) — gated by [`crate::auth::AdminAuthLayer`] at the router level.

use axum::Json;
use axum::extract::{Query, State};

use gatekeep_core::{EventConfig, EventId};

use crate::api::schemas::{ConfigRequest, MetricsQuery, PauseRequest, ReleaseRequest, ReleaseResponse};
use crate::error::ApiError;
use crate::state::AppState;

/// `POST /admin/release`.
pub async fn release(
    State(state): State<AppState>,
    Json(req): Json<ReleaseRequest>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    let event_id = EventId::new(req.event_id.clone());

    if let Some(rate) = req.rate_per_second {
        state
            .release
            .set_rate(&event_id, rate)
            .await
            .map_err(gatekeep_core::GatekeepError::from)?;
    }

    let released = state
        .release
        .release(&event_id, req.count)
        .await
        .map_err(gatekeep_core::GatekeepError::from)?;

    state.metrics.record_releases(event_id.as_str(), released);

    Ok(Json(ReleaseResponse {
        released,
        event_id: event_id.to_string(),
    }))
}

/// `POST /admin/pause` — `paused:true` pauses, `paused:false` resumes.
pub async fn pause(
    State(state): State<AppState>,
    Json(req): Json<PauseRequest>,
) -> Result<Json<gatekeep_core::ReleaseState>, ApiError> {
    let event_id = EventId::new(req.event_id);
    let state_view = if req.paused {
        state.release.pause(&event_id).await
    } else {
        state.release.resume(&event_id).await
    }
    .map_err(gatekeep_core::GatekeepError::from)?;

    Ok(Json(state_view))
}

/// `POST /admin/config` — merges the present fields onto the event's
/// current configuration and persists the result.
pub async fn set_config(
    State(state): State<AppState>,
    Json(req): Json<ConfigRequest>,
) -> Result<Json<EventConfig>, ApiError> {
    let event_id = EventId::new(req.event_id.clone());

    let current = state
        .queue
        .get_event_config(&event_id)
        .await
        .map_err(gatekeep_core::GatekeepError::from)?;
    let updated = req.apply(current);

    state
        .queue
        .set_event_config(&event_id, &updated)
        .await
        .map_err(gatekeep_core::GatekeepError::from)?;

    // The Release Controller reads capacity from its own cached/persisted
    // `ReleaseState`, not from `EventConfig` (which only seeds it on first
    // observation) — push a capacity change through explicitly so a later
    // reconfiguration actually takes effect (§4.E SetMaxCapacity).
    if req.max_capacity.is_some() {
        state
            .release
            .set_max_capacity(&event_id, updated.max_concurrent_admissions)
            .await
            .map_err(gatekeep_core::GatekeepError::from)?;
    }

    Ok(Json(updated))
}

/// `GET /admin/metrics?event_id=...` — per-event counters, or every event
/// this process has observed when `event_id` is omitted.
pub async fn metrics(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> Json<serde_json::Value> {
    let snapshot = state.metrics.snapshot(query.event_id.as_deref());
    let body: std::collections::HashMap<_, _> = snapshot.into_iter().collect();
    Json(serde_json::json!(body))
}
