//! Request/response DTOs for the HTTP surface (§6).
//!
//! Kept separate from `gatekeep_core::model` because these shapes are a
//! wire contract, not the domain model — `StatusView` doesn't carry an
//! admission token, but a heartbeat response must.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatekeep_core::{EventConfig, PriorityBucket, QueueId, QueueStatusKind, StatusView};

#[derive(Debug, Clone, Deserialize)]
pub struct JoinRequest {
    pub event_id: String,
    pub device_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub priority_bucket: Option<PriorityBucket>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusQuery {
    pub queue_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatRequest {
    pub queue_id: String,
}

/// The response shape shared by `/queue/join`, `/queue/status`, and
/// `/queue/heartbeat` (§6), widened past `StatusView` with the two fields
/// only heartbeat ever populates.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatusResponse {
    pub queue_id: QueueId,
    pub status: QueueStatusKind,
    pub position: i64,
    pub estimated_wait_seconds: i64,
    pub enqueued_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_heartbeat_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admission_token: Option<String>,
}

impl From<StatusView> for QueueStatusResponse {
    fn from(view: StatusView) -> Self {
        Self {
            queue_id: view.queue_id,
            status: view.status,
            position: view.position,
            estimated_wait_seconds: view.estimated_wait_seconds,
            enqueued_at: view.enqueued_at,
            last_heartbeat: view.last_heartbeat,
            next_heartbeat_seconds: None,
            admission_token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseRequest {
    pub event_id: String,
    pub count: u64,
    #[serde(default)]
    pub rate_per_second: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseResponse {
    pub released: u64,
    pub event_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PauseRequest {
    pub event_id: String,
    pub paused: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigRequest {
    pub event_id: String,
    pub enabled: Option<bool>,
    pub release_rate_per_second: Option<u64>,
    pub max_queue_size: Option<u64>,
    pub admission_token_ttl_seconds: Option<i64>,
    pub heartbeat_timeout_seconds: Option<i64>,
    pub max_capacity: Option<u64>,
    pub webhook_url: Option<String>,
}

impl ConfigRequest {
    /// Apply the present fields onto `base`, leaving everything else
    /// untouched (§4.D SetEventConfig is a merge, not a replace).
    #[must_use]
    pub fn apply(&self, mut base: EventConfig) -> EventConfig {
        if let Some(enabled) = self.enabled {
            base.enabled = enabled;
        }
        if let Some(rate) = self.release_rate_per_second {
            base.release_rate_per_second = rate;
        }
        if let Some(max_queue_size) = self.max_queue_size {
            base.max_queue_size = max_queue_size;
        }
        if let Some(ttl) = self.admission_token_ttl_seconds {
            base.admission_token_ttl_seconds = ttl;
        }
        if let Some(timeout) = self.heartbeat_timeout_seconds {
            base.heartbeat_timeout_seconds = timeout;
        }
        if let Some(max_capacity) = self.max_capacity {
            base.max_concurrent_admissions = Some(max_capacity);
        }
        if self.webhook_url.is_some() {
            base.webhook_url = self.webhook_url.clone();
        }
        base
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsQuery {
    pub event_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
    #[serde(default)]
    pub event_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}
