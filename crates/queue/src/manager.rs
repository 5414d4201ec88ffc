use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use gatekeep_core::{
    DeviceId, EventConfig, EventId, PriorityBucket, QueueEntry, QueueId, QueueStatusKind,
    StatusView, UserId,
};
use gatekeep_ratelimit::{RateLimitDecision, RateLimiter};
use gatekeep_state::{keys, PipelineOp, StoreAdapter};

use crate::error::QueueError;
use crate::position::position_and_wait;

const ENROLLMENT_RATE_LIMIT: u64 = 5;
const ENROLLMENT_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Request fields for [`QueueManager::enroll`] (§4.D Enroll).
#[derive(Debug, Clone, Default)]
pub struct EnrollRequest {
    pub user_id: Option<UserId>,
    pub priority_bucket: Option<PriorityBucket>,
    pub metadata: HashMap<String, String>,
}

fn entry_ttl(config: &EventConfig) -> Duration {
    Duration::from_secs(u64::try_from(config.entry_ttl_seconds()).unwrap_or(0))
}

/// Manages queue membership, admission bookkeeping, and per-event
/// configuration (§4.D). Holds a shared handle to the store rather than
/// borrowing it, so it can be cloned into request handlers and the release
/// scheduler's background task alike.
#[derive(Clone)]
pub struct QueueManager {
    store: Arc<dyn StoreAdapter>,
}

impl QueueManager {
    #[must_use]
    pub fn new(store: Arc<dyn StoreAdapter>) -> Self {
        Self { store }
    }

    /// Enroll `device_id` into `event_id`'s queue, or return its existing
    /// live entry unchanged if one is already enrolled (§4.D Enroll).
    pub async fn enroll(
        &self,
        event_id: EventId,
        device_id: DeviceId,
        req: EnrollRequest,
    ) -> Result<QueueEntry, QueueError> {
        if event_id.is_empty() {
            return Err(QueueError::Validation("event_id must not be empty".into()));
        }
        if device_id.is_empty() {
            return Err(QueueError::Validation("device_id must not be empty".into()));
        }

        let user_id = req
            .user_id
            .unwrap_or_else(|| UserId::new(device_id.as_str()));
        let priority_bucket = req.priority_bucket.unwrap_or_default();

        let config = self.get_event_config(&event_id).await?;
        if !config.enabled {
            return Err(QueueError::QueueDisabled {
                event_id: event_id.to_string(),
            });
        }

        let limiter = RateLimiter::new(self.store.as_ref());
        let rate_key = keys::rate_limit_counter(device_id.as_str(), event_id.as_str());
        if let RateLimitDecision::Limited {
            retry_after_seconds,
        } = limiter
            .check_and_increment(&rate_key, ENROLLMENT_RATE_LIMIT, ENROLLMENT_RATE_WINDOW)
            .await?
        {
            return Err(QueueError::RateLimited {
                retry_after_seconds,
            });
        }

        let idempotency_key = keys::idempotency(device_id.as_str(), event_id.as_str());
        if let Some(existing_queue_id) = self.store.get_string(&idempotency_key).await? {
            if let Some(mut entry) = self.load_entry(&existing_queue_id).await? {
                self.compute_status(&mut entry, &config).await?;
                self.persist_position_best_effort(&entry, &config).await;
                return Ok(entry);
            }
            // The idempotency mapping outlived its entry (a losing enrollment's
            // orphan, or a TTL race); fall through to a fresh enrollment.
        }

        let queue_size = self.queue_size(&event_id).await?;
        if config.max_queue_size != 0 && queue_size >= config.max_queue_size {
            return Err(QueueError::QueueFull {
                event_id: event_id.to_string(),
            });
        }

        let queue_id = QueueId::generate();
        let now = Utc::now();
        let mut entry = QueueEntry {
            queue_id: queue_id.clone(),
            event_id: event_id.clone(),
            device_id: device_id.clone(),
            user_id,
            position: 0,
            enqueued_at: now,
            last_heartbeat: now,
            priority_bucket,
            metadata: req.metadata,
        };

        let ttl = entry_ttl(&config);
        let entry_json = serde_json::to_string(&entry)?;

        let mut ops = vec![
            PipelineOp::SetString {
                key: keys::entry(queue_id.as_str()),
                value: entry_json,
                ttl: Some(ttl),
            },
            PipelineOp::SetString {
                key: idempotency_key,
                value: queue_id.to_string(),
                ttl: Some(ttl),
            },
        ];
        match priority_bucket {
            PriorityBucket::Normal => ops.push(PipelineOp::ListPushRight {
                key: keys::normal_list(event_id.as_str()),
                value: queue_id.to_string(),
            }),
            PriorityBucket::High => ops.push(PipelineOp::ZsetAdd {
                key: keys::priority_zset(event_id.as_str()),
                member: queue_id.to_string(),
                score: micros_score(now),
            }),
        }

        self.store.pipeline(&ops).await?;
        gatekeep_state::mark_event_active(self.store.as_ref(), event_id.as_str()).await?;

        self.compute_status(&mut entry, &config).await?;
        self.persist_position_best_effort(&entry, &config).await;

        info!(%event_id, %queue_id, bucket = %priority_bucket, "enrolled");
        Ok(entry)
    }

    /// Current lifecycle view of a queue entry (§4.D Status).
    pub async fn status(&self, queue_id: &QueueId) -> Result<StatusView, QueueError> {
        let mut entry = self.require_entry(queue_id).await?;
        let config = self.get_event_config(&entry.event_id).await?;
        let view = self.compute_status(&mut entry, &config).await?;
        if view.status == QueueStatusKind::Waiting {
            self.persist_position_best_effort(&entry, &config).await;
        }
        Ok(view)
    }

    /// Same as [`Self::status`], but also extends the entry's liveness —
    /// unless it is already expired, in which case nothing is rewritten
    /// (§4.D Heartbeat).
    pub async fn heartbeat(&self, queue_id: &QueueId) -> Result<StatusView, QueueError> {
        let mut entry = self.require_entry(queue_id).await?;
        let config = self.get_event_config(&entry.event_id).await?;

        let view = self.compute_status(&mut entry, &config).await?;
        if view.status == QueueStatusKind::Expired {
            return Ok(view);
        }

        entry.last_heartbeat = Utc::now();
        let ttl = entry_ttl(&config);
        let entry_json = serde_json::to_string(&entry)?;
        let idempotency_key = keys::idempotency(entry.device_id.as_str(), entry.event_id.as_str());

        self.store
            .pipeline(&[
                PipelineOp::SetString {
                    key: keys::entry(queue_id.as_str()),
                    value: entry_json,
                    ttl: Some(ttl),
                },
                PipelineOp::SetString {
                    key: idempotency_key,
                    value: queue_id.to_string(),
                    ttl: Some(ttl),
                },
            ])
            .await?;

        Ok(StatusView {
            last_heartbeat: entry.last_heartbeat,
            ..view
        })
    }

    /// Transition an entry from queue-member to admitted: add it to the
    /// admitted set and remove it from its queue structure. Called only by
    /// the Release Controller, after the atomic pop that already removed it
    /// from that structure — the removal here is therefore idempotent, not
    /// load-bearing (§4.D MarkAdmitted).
    pub async fn mark_admitted(
        &self,
        queue_id: &QueueId,
        event_id: &EventId,
        priority_bucket: PriorityBucket,
    ) -> Result<(), QueueError> {
        self.store
            .set_add(&keys::admitted_set(event_id.as_str()), queue_id.as_str())
            .await?;
        match priority_bucket {
            PriorityBucket::Normal => {
                self.store
                    .list_remove_first(&keys::normal_list(event_id.as_str()), queue_id.as_str())
                    .await?;
            }
            PriorityBucket::High => {
                self.store
                    .zset_remove(&keys::priority_zset(event_id.as_str()), queue_id.as_str())
                    .await?;
            }
        }
        Ok(())
    }

    /// Persist per-event configuration (§4.D SetEventConfig). No expiry.
    pub async fn set_event_config(
        &self,
        event_id: &EventId,
        config: &EventConfig,
    ) -> Result<(), QueueError> {
        let json = serde_json::to_string(config)?;
        self.store
            .set_string(&keys::event_config(event_id.as_str()), &json, None)
            .await?;
        gatekeep_state::mark_event_active(self.store.as_ref(), event_id.as_str()).await?;
        Ok(())
    }

    /// Load per-event configuration, or the documented default if absent
    /// (§4.D GetEventConfig).
    pub async fn get_event_config(&self, event_id: &EventId) -> Result<EventConfig, QueueError> {
        match self
            .store
            .get_string(&keys::event_config(event_id.as_str()))
            .await?
        {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(EventConfig::default()),
        }
    }

    async fn require_entry(&self, queue_id: &QueueId) -> Result<QueueEntry, QueueError> {
        self.load_entry(queue_id.as_str())
            .await?
            .ok_or_else(|| QueueError::NotFound(format!("unknown queue_id {queue_id}")))
    }

    async fn load_entry(&self, queue_id: &str) -> Result<Option<QueueEntry>, QueueError> {
        match self.store.get_string(&keys::entry(queue_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Combined length of `event_id`'s `normal` and `high` queue structures,
    /// used by the release scheduler to skip events with nothing to release.
    pub async fn queue_size(&self, event_id: &EventId) -> Result<u64, QueueError> {
        let normal = self
            .store
            .list_len(&keys::normal_list(event_id.as_str()))
            .await?;
        let high = self
            .store
            .zset_card(&keys::priority_zset(event_id.as_str()))
            .await?;
        Ok(u64::try_from(normal + high).unwrap_or(u64::MAX))
    }

    async fn compute_status(
        &self,
        entry: &mut QueueEntry,
        config: &EventConfig,
    ) -> Result<StatusView, QueueError> {
        let elapsed = (Utc::now() - entry.last_heartbeat).num_seconds();
        if elapsed > config.liveness_deadline_seconds() {
            return Ok(Self::status_view(entry, QueueStatusKind::Expired, 0, 0));
        }

        if self
            .store
            .set_contains(&keys::admitted_set(entry.event_id.as_str()), entry.queue_id.as_str())
            .await?
        {
            return Ok(Self::status_view(entry, QueueStatusKind::Admitted, 0, 0));
        }

        match position_and_wait(
            self.store.as_ref(),
            entry.event_id.as_str(),
            entry.queue_id.as_str(),
            entry.priority_bucket,
            config,
        )
        .await?
        {
            Some((position, wait)) => {
                entry.position = position;
                Ok(Self::status_view(entry, QueueStatusKind::Waiting, position, wait))
            }
            None => Ok(Self::status_view(entry, QueueStatusKind::Expired, 0, 0)),
        }
    }

    fn status_view(
        entry: &QueueEntry,
        status: QueueStatusKind,
        position: i64,
        estimated_wait_seconds: i64,
    ) -> StatusView {
        StatusView {
            queue_id: entry.queue_id.clone(),
            status,
            position,
            estimated_wait_seconds,
            enqueued_at: entry.enqueued_at,
            last_heartbeat: entry.last_heartbeat,
        }
    }

    async fn persist_position_best_effort(&self, entry: &QueueEntry, config: &EventConfig) {
        let Ok(json) = serde_json::to_string(entry) else {
            return;
        };
        let ttl = entry_ttl(config);
        let _ = self
            .store
            .set_string(&keys::entry(entry.queue_id.as_str()), &json, Some(ttl))
            .await;
    }
}

fn micros_score(at: chrono::DateTime<Utc>) -> f64 {
    // Scores are f64 (matching a sorted-set backend's native score type);
    // microsecond epoch timestamps stay exactly representable until the
    // year 2255 (2^52 us), comfortably past any deployment horizon here.
    at.timestamp_micros() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeep_state_memory::MemoryStore;

    fn manager() -> QueueManager {
        QueueManager::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn enroll_assigns_position_one_to_first_entry() {
        let mgr = manager();
        let entry = mgr
            .enroll(
                EventId::new("concert"),
                DeviceId::new("d1"),
                EnrollRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(entry.position, 1);
        assert_eq!(entry.priority_bucket, PriorityBucket::Normal);
    }

    #[tokio::test]
    async fn enroll_is_idempotent_for_same_device_and_event() {
        let mgr = manager();
        let event_id = EventId::new("concert");
        let device_id = DeviceId::new("d1");

        let first = mgr
            .enroll(event_id.clone(), device_id.clone(), EnrollRequest::default())
            .await
            .unwrap();
        let second = mgr
            .enroll(event_id, device_id, EnrollRequest::default())
            .await
            .unwrap();

        assert_eq!(first.queue_id, second.queue_id);
        assert_eq!(first.enqueued_at, second.enqueued_at);
    }

    #[tokio::test]
    async fn disabled_event_rejects_enrollment() {
        let mgr = manager();
        let event_id = EventId::new("concert");
        let mut config = EventConfig::default();
        config.enabled = false;
        mgr.set_event_config(&event_id, &config).await.unwrap();

        let err = mgr
            .enroll(event_id, DeviceId::new("d1"), EnrollRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::QueueDisabled { .. }));
    }

    #[tokio::test]
    async fn queue_full_rejects_enrollment_past_the_limit() {
        let mgr = manager();
        let event_id = EventId::new("concert");
        let mut config = EventConfig::default();
        config.max_queue_size = 1;
        mgr.set_event_config(&event_id, &config).await.unwrap();

        mgr.enroll(event_id.clone(), DeviceId::new("d1"), EnrollRequest::default())
            .await
            .unwrap();
        let err = mgr
            .enroll(event_id, DeviceId::new("d2"), EnrollRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::QueueFull { .. }));
    }

    #[tokio::test]
    async fn sixth_enrollment_within_window_is_rate_limited() {
        let mgr = manager();
        // Quota is keyed by (device_id, event_id) and consumed on every
        // enroll() call, even an idempotent one — five calls from the same
        // device exhaust it regardless of whether each returns a fresh entry.
        let event_id = EventId::new("concert");
        let device_id = DeviceId::new("d1");
        for _ in 0..5 {
            mgr.enroll(event_id.clone(), device_id.clone(), EnrollRequest::default())
                .await
                .unwrap();
        }
        let sixth = mgr
            .enroll(event_id, device_id, EnrollRequest::default())
            .await;
        assert!(matches!(sixth, Err(QueueError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn priority_entry_ranks_ahead_of_normal() {
        let mgr = manager();
        let event_id = EventId::new("concert");
        mgr.enroll(event_id.clone(), DeviceId::new("normal-1"), EnrollRequest::default())
            .await
            .unwrap();

        let high = mgr
            .enroll(
                event_id,
                DeviceId::new("high-1"),
                EnrollRequest {
                    priority_bucket: Some(PriorityBucket::High),
                    ..EnrollRequest::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(high.position, 1);
    }

    #[tokio::test]
    async fn status_not_found_for_unknown_queue_id() {
        let mgr = manager();
        let err = mgr.status(&QueueId::generate()).await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[tokio::test]
    async fn mark_admitted_moves_entry_out_of_queue_structure() {
        let mgr = manager();
        let event_id = EventId::new("concert");
        let entry = mgr
            .enroll(event_id.clone(), DeviceId::new("d1"), EnrollRequest::default())
            .await
            .unwrap();

        mgr.mark_admitted(&entry.queue_id, &event_id, entry.priority_bucket)
            .await
            .unwrap();

        let status = mgr.status(&entry.queue_id).await.unwrap();
        assert_eq!(status.status, QueueStatusKind::Admitted);
    }

    #[tokio::test]
    async fn get_event_config_returns_defaults_when_absent() {
        let mgr = manager();
        let config = mgr.get_event_config(&EventId::new("never-configured")).await.unwrap();
        assert_eq!(config, EventConfig::default());
    }
}
