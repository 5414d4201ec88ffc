use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DeviceId, EventId, QueueId, UserId};

/// The tier an entry waits in. `High` strictly preempts `Normal` (§5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityBucket {
    High,
    Normal,
}

impl Default for PriorityBucket {
    fn default() -> Self {
        Self::Normal
    }
}

impl std::fmt::Display for PriorityBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::High => "high",
            Self::Normal => "normal",
        })
    }
}

impl std::str::FromStr for PriorityBucket {
    type Err = crate::GatekeepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            other => Err(crate::GatekeepError::Validation(format!(
                "unknown priority_bucket: {other}"
            ))),
        }
    }
}

/// Per-event admission control configuration (§3).
///
/// Persistent, keyed by `event_id`. Absent configuration is not an error —
/// callers fall back to [`EventConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    pub enabled: bool,
    /// `0` means unlimited.
    pub max_queue_size: u64,
    pub release_rate_per_second: u64,
    pub admission_token_ttl_seconds: i64,
    pub heartbeat_timeout_seconds: i64,
    pub max_concurrent_admissions: Option<u64>,
    pub webhook_url: Option<String>,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_queue_size: 10_000,
            release_rate_per_second: 10,
            admission_token_ttl_seconds: 3_600,
            heartbeat_timeout_seconds: 60,
            max_concurrent_admissions: None,
            webhook_url: None,
        }
    }
}

impl EventConfig {
    /// Entry TTL: `2 * heartbeat_timeout_seconds`, floored at 30 minutes (§4.D step 7).
    #[must_use]
    pub fn entry_ttl_seconds(&self) -> i64 {
        (2 * self.heartbeat_timeout_seconds).max(30 * 60)
    }

    /// `2 * heartbeat_timeout_seconds`, the liveness deadline used by
    /// `Status`/`Heartbeat` (§4.D) — distinct from the floor applied to the
    /// store TTL so an operator's short `heartbeat_timeout_seconds` still
    /// expires entries promptly even though the underlying record lingers.
    #[must_use]
    pub fn liveness_deadline_seconds(&self) -> i64 {
        2 * self.heartbeat_timeout_seconds
    }
}

/// One waiter's record (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub queue_id: QueueId,
    pub event_id: EventId,
    pub device_id: DeviceId,
    pub user_id: UserId,
    pub position: i64,
    pub enqueued_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub priority_bucket: PriorityBucket,
    /// Opaque caller-supplied tags, carried on the entry for observability.
    /// Never interpreted by the queue manager or release controller.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// The lifecycle state a [`QueueEntry`] is observed in by `Status`/`Heartbeat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatusKind {
    Waiting,
    Admitted,
    Expired,
}

impl std::fmt::Display for QueueStatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Waiting => "waiting",
            Self::Admitted => "admitted",
            Self::Expired => "expired",
        })
    }
}

/// The response shape common to join/status/heartbeat (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusView {
    pub queue_id: QueueId,
    pub status: QueueStatusKind,
    pub position: i64,
    pub estimated_wait_seconds: i64,
    pub enqueued_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

/// Release Controller state for one event (or the global default) (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseState {
    pub paused: bool,
    pub rate_per_second: u64,
    pub current_admissions: u64,
    pub max_concurrent_admissions: Option<u64>,
}

impl Default for ReleaseState {
    fn default() -> Self {
        Self {
            paused: false,
            rate_per_second: 10,
            current_admissions: 0,
            max_concurrent_admissions: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn priority_bucket_defaults_to_normal() {
        assert_eq!(PriorityBucket::default(), PriorityBucket::Normal);
    }

    #[test]
    fn priority_bucket_roundtrip() {
        assert_eq!(PriorityBucket::from_str("high").unwrap(), PriorityBucket::High);
        assert_eq!(PriorityBucket::from_str("normal").unwrap(), PriorityBucket::Normal);
        assert!(PriorityBucket::from_str("urgent").is_err());
    }

    #[test]
    fn event_config_defaults_match_spec() {
        let cfg = EventConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.max_queue_size, 10_000);
        assert_eq!(cfg.release_rate_per_second, 10);
        assert_eq!(cfg.admission_token_ttl_seconds, 3_600);
        assert_eq!(cfg.heartbeat_timeout_seconds, 60);
    }

    #[test]
    fn entry_ttl_floors_at_thirty_minutes() {
        let mut cfg = EventConfig::default();
        cfg.heartbeat_timeout_seconds = 10;
        assert_eq!(cfg.entry_ttl_seconds(), 1_800);
        assert_eq!(cfg.liveness_deadline_seconds(), 20);

        cfg.heartbeat_timeout_seconds = 3_600;
        assert_eq!(cfg.entry_ttl_seconds(), 7_200);
    }
}
