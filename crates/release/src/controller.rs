use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};

use gatekeep_core::{EventId, PriorityBucket, QueueEntry, ReleaseState};
use gatekeep_queue::QueueManager;
use gatekeep_state::{keys, StoreAdapter};
use gatekeep_token::{TokenCodec, TokenMetadataStore};

use crate::error::ReleaseError;
use crate::webhook::{AdmissionWebhookPayload, WebhookDispatcher};

/// Release counters and pause/capacity state, one per event plus an
/// implicit global default (§4.E, §3 `ReleaseState`).
///
/// The authoritative copy lives in the store; this struct is a read-through,
/// write-behind in-memory mirror guarded by a single `RwLock`, matching the
/// only in-process lock the concurrency model allows outside the store
/// itself (§5 Shared-resource policy).
pub struct ReleaseController {
    store: Arc<dyn StoreAdapter>,
    queue: QueueManager,
    token_codec: TokenCodec,
    webhook: Arc<WebhookDispatcher>,
    state: RwLock<HashMap<String, ReleaseState>>,
}

impl ReleaseController {
    #[must_use]
    pub fn new(
        store: Arc<dyn StoreAdapter>,
        queue: QueueManager,
        token_codec: TokenCodec,
        webhook: Arc<WebhookDispatcher>,
    ) -> Self {
        Self {
            store,
            queue,
            token_codec,
            webhook,
            state: RwLock::new(HashMap::new()),
        }
    }

    /// Pop up to `count` entries (capped by the event's configured rate and
    /// remaining capacity), mint a token for each, and mark them admitted
    /// (§4.E Release).
    pub async fn release(&self, event_id: &EventId, count: u64) -> Result<u64, ReleaseError> {
        gatekeep_state::mark_event_active(self.store.as_ref(), event_id.as_str()).await?;

        let snapshot = self.load_or_init_state(event_id).await?;
        if snapshot.paused {
            return Err(ReleaseError::Paused {
                event_id: event_id.to_string(),
            });
        }

        let available = snapshot
            .max_concurrent_admissions
            .map(|max| i64::try_from(max).unwrap_or(i64::MAX) - i64::try_from(snapshot.current_admissions).unwrap_or(0));
        if matches!(available, Some(a) if a <= 0) {
            return Err(ReleaseError::CapacityReached {
                event_id: event_id.to_string(),
            });
        }

        let rate = i64::try_from(snapshot.rate_per_second).unwrap_or(i64::MAX);
        let requested = i64::try_from(count).unwrap_or(i64::MAX);
        let effective = [requested, rate, available.unwrap_or(i64::MAX)]
            .into_iter()
            .min()
            .unwrap_or(0)
            .max(0);

        let config = self.queue.get_event_config(event_id).await?;
        let token_ttl = Duration::from_secs(
            u64::try_from(config.admission_token_ttl_seconds).unwrap_or(3_600),
        );
        let metadata = TokenMetadataStore::new(self.store.as_ref());

        let mut released = 0u64;
        for _ in 0..effective {
            let Some((entry, bucket)) = self.pop_one(event_id).await? else {
                break;
            };

            let (token, payload) = self
                .token_codec
                .sign(
                    entry.event_id.clone(),
                    entry.device_id.clone(),
                    entry.user_id.clone(),
                    entry.queue_id.clone(),
                    token_ttl,
                    &metadata,
                )
                .await?;

            self.queue
                .mark_admitted(&entry.queue_id, event_id, bucket)
                .await?;

            // Stash the raw token, keyed by queue_id, so a later Heartbeat
            // call can hand it to the client (§4.D Heartbeat); the mint
            // above only persisted its hash, for revocation.
            if let Err(err) = self
                .store
                .set_string(&keys::issued_token(entry.queue_id.as_str()), &token, Some(token_ttl))
                .await
            {
                warn!(%event_id, queue_id = %entry.queue_id, error = %err, "failed to stash issued token for heartbeat delivery");
            }

            {
                let mut guard = self.state.write().await;
                if let Some(state) = guard.get_mut(event_id.as_str()) {
                    state.current_admissions += 1;
                }
            }
            released += 1;

            if let Some(url) = config.webhook_url.clone() {
                let webhook = Arc::clone(&self.webhook);
                let admission_payload = AdmissionWebhookPayload {
                    event: "admission_granted",
                    event_id: entry.event_id.clone(),
                    device_id: entry.device_id.clone(),
                    user_id: entry.user_id.clone(),
                    token,
                    issued_at: payload.issued_at,
                    expires_at: payload.expires_at,
                    queue_id: entry.queue_id.clone(),
                };
                tokio::spawn(async move { webhook.dispatch(&url, &admission_payload).await });
            }
        }

        self.persist_state(event_id).await?;
        info!(%event_id, released, "release cycle completed");
        Ok(released)
    }

    /// Pop the highest-priority waiting entry: `high` strictly preempts
    /// `normal` (§5 Ordering guarantees). Skips (and keeps popping) entries
    /// whose record is missing — a TTL race, not an error (§4.E step 5.b).
    async fn pop_one(
        &self,
        event_id: &EventId,
    ) -> Result<Option<(QueueEntry, PriorityBucket)>, ReleaseError> {
        loop {
            let popped = match self
                .store
                .zset_pop_min(&keys::priority_zset(event_id.as_str()))
                .await?
            {
                Some((queue_id, _score)) => Some((queue_id, PriorityBucket::High)),
                None => self
                    .store
                    .list_pop_left(&keys::normal_list(event_id.as_str()))
                    .await?
                    .map(|queue_id| (queue_id, PriorityBucket::Normal)),
            };

            let Some((queue_id, bucket)) = popped else {
                return Ok(None);
            };

            match self.store.get_string(&keys::entry(&queue_id)).await? {
                Some(json) => {
                    let entry: QueueEntry = serde_json::from_str(&json)?;
                    return Ok(Some((entry, bucket)));
                }
                None => continue,
            }
        }
    }

    /// Stop releasing for `event_id` (or globally, if `event_id` is `None`)
    /// until [`Self::resume`] (§4.E Pause/Resume).
    pub async fn pause(&self, event_id: &EventId) -> Result<ReleaseState, ReleaseError> {
        self.mutate(event_id, |state| state.paused = true).await
    }

    pub async fn resume(&self, event_id: &EventId) -> Result<ReleaseState, ReleaseError> {
        self.mutate(event_id, |state| state.paused = false).await
    }

    pub async fn set_rate(
        &self,
        event_id: &EventId,
        rate_per_second: u64,
    ) -> Result<ReleaseState, ReleaseError> {
        self.mutate(event_id, |state| state.rate_per_second = rate_per_second)
            .await
    }

    pub async fn set_max_capacity(
        &self,
        event_id: &EventId,
        max_concurrent_admissions: Option<u64>,
    ) -> Result<ReleaseState, ReleaseError> {
        self.mutate(event_id, |state| {
            state.max_concurrent_admissions = max_concurrent_admissions;
        })
        .await
    }

    /// Free one admission slot for `event_id` (§4.E DecrementCapacity). Not
    /// called by this service itself — it is the integration point for a
    /// backend webhook or token-expiry observer that has determined an
    /// admitted client is no longer occupying its slot. Saturates at zero
    /// rather than panicking on an unmatched decrement.
    pub async fn decrement_capacity(&self, event_id: &EventId) -> Result<ReleaseState, ReleaseError> {
        self.mutate(event_id, |state| {
            state.current_admissions = state.current_admissions.saturating_sub(1);
        })
        .await
    }

    /// Current mirrored state for `event_id`, initializing it from the
    /// event's configuration if this is the first time it has been
    /// observed by this controller instance.
    pub async fn state(&self, event_id: &EventId) -> Result<ReleaseState, ReleaseError> {
        self.load_or_init_state(event_id).await
    }

    async fn mutate(
        &self,
        event_id: &EventId,
        f: impl FnOnce(&mut ReleaseState),
    ) -> Result<ReleaseState, ReleaseError> {
        self.load_or_init_state(event_id).await?;
        let updated = {
            let mut guard = self.state.write().await;
            let state = guard
                .get_mut(event_id.as_str())
                .expect("load_or_init_state just inserted this entry");
            f(state);
            state.clone()
        };
        self.persist_state(event_id).await?;
        info!(%event_id, ?updated, "release state changed");
        Ok(updated)
    }

    async fn load_or_init_state(&self, event_id: &EventId) -> Result<ReleaseState, ReleaseError> {
        if let Some(state) = self.state.read().await.get(event_id.as_str()) {
            return Ok(state.clone());
        }

        let mut guard = self.state.write().await;
        if let Some(state) = guard.get(event_id.as_str()) {
            return Ok(state.clone());
        }

        let state = match self
            .store
            .get_string(&keys::release_state(Some(event_id.as_str())))
            .await?
        {
            Some(json) => serde_json::from_str(&json)?,
            None => {
                let config = self.queue.get_event_config(event_id).await?;
                ReleaseState {
                    paused: !config.enabled,
                    rate_per_second: config.release_rate_per_second,
                    current_admissions: 0,
                    max_concurrent_admissions: config.max_concurrent_admissions,
                }
            }
        };
        guard.insert(event_id.to_string(), state.clone());
        Ok(state)
    }

    async fn persist_state(&self, event_id: &EventId) -> Result<(), ReleaseError> {
        let state = self
            .state
            .read()
            .await
            .get(event_id.as_str())
            .cloned()
            .unwrap_or_default();
        let json = serde_json::to_string(&state)?;
        self.store
            .set_string(&keys::release_state(Some(event_id.as_str())), &json, None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeep_core::EventConfig;
    use gatekeep_queue::EnrollRequest;
    use gatekeep_state_memory::MemoryStore;
    use gatekeep_token::KeyRing;

    fn controller() -> (ReleaseController, QueueManager) {
        let store: Arc<dyn StoreAdapter> = Arc::new(MemoryStore::new());
        let queue = QueueManager::new(Arc::clone(&store));
        let codec = TokenCodec::new(KeyRing::single(secrecy::SecretString::from(
            "test-secret-test-secret-32bytes!".to_owned(),
        )));
        let webhook = Arc::new(WebhookDispatcher::new(None));
        (
            ReleaseController::new(store, queue.clone(), codec, webhook),
            queue,
        )
    }

    #[tokio::test]
    async fn release_admits_up_to_the_configured_rate() {
        let (controller, queue) = controller();
        let event_id = EventId::new("concert");
        let mut config = EventConfig::default();
        config.release_rate_per_second = 1;
        queue.set_event_config(&event_id, &config).await.unwrap();

        for i in 0..2 {
            queue
                .enroll(
                    event_id.clone(),
                    gatekeep_core::DeviceId::new(format!("d{i}")),
                    EnrollRequest::default(),
                )
                .await
                .unwrap();
        }

        let released = controller.release(&event_id, 10).await.unwrap();
        assert_eq!(released, 1);
    }

    #[tokio::test]
    async fn paused_event_rejects_release() {
        let (controller, _queue) = controller();
        let event_id = EventId::new("concert");
        controller.pause(&event_id).await.unwrap();

        let err = controller.release(&event_id, 1).await.unwrap_err();
        assert!(matches!(err, ReleaseError::Paused { .. }));
    }

    #[tokio::test]
    async fn capacity_reached_rejects_release() {
        let (controller, queue) = controller();
        let event_id = EventId::new("concert");
        controller.set_max_capacity(&event_id, Some(0)).await.unwrap();
        queue
            .enroll(
                event_id.clone(),
                gatekeep_core::DeviceId::new("d1"),
                EnrollRequest::default(),
            )
            .await
            .unwrap();

        let err = controller.release(&event_id, 1).await.unwrap_err();
        assert!(matches!(err, ReleaseError::CapacityReached { .. }));
    }

    #[tokio::test]
    async fn decrement_capacity_frees_a_slot_for_the_next_release() {
        let (controller, queue) = controller();
        let event_id = EventId::new("concert");
        controller.set_max_capacity(&event_id, Some(1)).await.unwrap();
        for i in 0..2 {
            queue
                .enroll(
                    event_id.clone(),
                    gatekeep_core::DeviceId::new(format!("d{i}")),
                    EnrollRequest::default(),
                )
                .await
                .unwrap();
        }

        assert_eq!(controller.release(&event_id, 1).await.unwrap(), 1);
        assert!(matches!(
            controller.release(&event_id, 1).await.unwrap_err(),
            ReleaseError::CapacityReached { .. }
        ));

        let state = controller.decrement_capacity(&event_id).await.unwrap();
        assert_eq!(state.current_admissions, 0);
        assert_eq!(controller.release(&event_id, 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn decrement_capacity_saturates_at_zero() {
        let (controller, _queue) = controller();
        let event_id = EventId::new("concert");
        let state = controller.decrement_capacity(&event_id).await.unwrap();
        assert_eq!(state.current_admissions, 0);
    }

    #[tokio::test]
    async fn empty_queue_releases_nothing_without_error() {
        let (controller, _queue) = controller();
        let released = controller.release(&EventId::new("concert"), 5).await.unwrap();
        assert_eq!(released, 0);
    }

    #[tokio::test]
    async fn high_priority_entry_is_released_before_normal() {
        let (controller, queue) = controller();
        let event_id = EventId::new("concert");
        let normal = queue
            .enroll(
                event_id.clone(),
                gatekeep_core::DeviceId::new("normal-1"),
                EnrollRequest::default(),
            )
            .await
            .unwrap();
        let high = queue
            .enroll(
                event_id.clone(),
                gatekeep_core::DeviceId::new("high-1"),
                EnrollRequest {
                    priority_bucket: Some(PriorityBucket::High),
                    ..EnrollRequest::default()
                },
            )
            .await
            .unwrap();

        controller.release(&event_id, 1).await.unwrap();

        let high_status = queue.status(&high.queue_id).await.unwrap();
        let normal_status = queue.status(&normal.queue_id).await.unwrap();
        assert_eq!(high_status.status, gatekeep_core::QueueStatusKind::Admitted);
        assert_eq!(normal_status.status, gatekeep_core::QueueStatusKind::Waiting);
    }
}
