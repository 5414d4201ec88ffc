//! `GET /health` and `GET /metrics` (§6) — both unauthenticated.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use gatekeep_state::keys;

use crate::metrics::QueueDepth;
use crate::state::AppState;

/// `GET /health` — `{"status":"healthy","store":"connected"}`, or 503 if the
/// store doesn't answer a ping.
pub async fn health(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "healthy", "store": "connected" })),
        )
            .into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unhealthy",
                "store": "unreachable",
                "error": err.to_string(),
            })),
        )
            .into_response(),
    }
}

/// `GET /metrics` — Prometheus text exposition over every event this
/// process has observed.
pub async fn metrics(State(state): State<AppState>) -> Response {
    let event_ids = gatekeep_state::active_event_ids(state.store.as_ref())
        .await
        .unwrap_or_default();

    let mut depths = Vec::with_capacity(event_ids.len());
    for event_id in event_ids {
        let normal = state
            .store
            .list_len(&keys::normal_list(&event_id))
            .await
            .unwrap_or(0);
        let high = state
            .store
            .zset_card(&keys::priority_zset(&event_id))
            .await
            .unwrap_or(0);
        depths.push(QueueDepth {
            event_id,
            normal,
            high,
        });
    }

    let body = state.metrics.render_prometheus(&depths);
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}
