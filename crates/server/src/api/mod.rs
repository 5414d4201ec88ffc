pub mod admin;
pub mod admission;
pub mod health;
pub mod queue;
pub mod schemas;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::AdminAuthLayer;
use crate::ratelimit::IpRateLimitLayer;
use crate::state::AppState;

/// Assemble the full HTTP surface (§6): public device-facing and health
/// routes, plus an admin subtree gated by [`AdminAuthLayer`].
#[must_use]
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .route("/queue/join", post(queue::join))
        .route("/queue/status", get(queue::status))
        .route("/queue/heartbeat", post(queue::heartbeat))
        .route("/admission/verify", post(admission::verify));

    let admin = Router::new()
        .route("/admin/release", post(admin::release))
        .route("/admin/pause", post(admin::pause))
        .route("/admin/config", post(admin::set_config))
        .route("/admin/metrics", get(admin::metrics))
        .layer(AdminAuthLayer::new(state.admin_api_key.clone()));

    Router::new()
        .merge(public)
        .merge(admin)
        .layer(IpRateLimitLayer::new(state.store.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
