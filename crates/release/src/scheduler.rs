use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use gatekeep_core::EventId;
use gatekeep_queue::QueueManager;
use gatekeep_state::StoreAdapter;

use crate::controller::ReleaseController;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Drives [`ReleaseController::release`] once per second for every event
/// that has ever been marked active on this store (§4.E Scheduler loop).
///
/// Holds no state of its own beyond what it needs to find events to drive —
/// per-event pause/rate/capacity all live in the [`ReleaseController`] it
/// wraps, which is also reachable directly from request handlers.
pub struct ReleaseScheduler {
    store: Arc<dyn StoreAdapter>,
    queue: QueueManager,
    controller: Arc<ReleaseController>,
}

impl ReleaseScheduler {
    #[must_use]
    pub fn new(
        store: Arc<dyn StoreAdapter>,
        queue: QueueManager,
        controller: Arc<ReleaseController>,
    ) -> Self {
        Self {
            store,
            queue,
            controller,
        }
    }

    /// Run the scheduler loop until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("release scheduler shutting down");
                    return;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        let event_ids = match gatekeep_state::active_event_ids(self.store.as_ref()).await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "failed to list active events for release tick");
                return;
            }
        };

        let mut considered = 0;
        let mut released_total = 0u64;
        for raw_event_id in event_ids {
            let event_id = EventId::new(raw_event_id);
            match self.queue.queue_size(&event_id).await {
                Ok(0) => continue,
                Ok(_) => {}
                Err(err) => {
                    warn!(%event_id, error = %err, "failed to read queue size during release tick");
                    continue;
                }
            }
            considered += 1;

            let state = match self.controller.state(&event_id).await {
                Ok(state) => state,
                Err(err) => {
                    warn!(%event_id, error = %err, "failed to load release state during release tick");
                    continue;
                }
            };
            if state.paused || state.rate_per_second == 0 {
                continue;
            }

            match self.controller.release(&event_id, state.rate_per_second).await {
                Ok(released) => released_total += released,
                Err(err) => {
                    warn!(%event_id, error = %err, "release failed during scheduler tick");
                }
            }
        }

        debug!(considered, released_total, "release scheduler tick");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeep_core::{DeviceId, EventConfig};
    use gatekeep_queue::EnrollRequest;
    use gatekeep_state_memory::MemoryStore;
    use gatekeep_token::{KeyRing, TokenCodec};
    use secrecy::SecretString;

    use crate::webhook::WebhookDispatcher;

    #[tokio::test(start_paused = true)]
    async fn tick_releases_from_events_with_nonempty_queues() {
        let store: Arc<dyn StoreAdapter> = Arc::new(MemoryStore::new());
        let queue = QueueManager::new(Arc::clone(&store));
        let codec = TokenCodec::new(KeyRing::single(SecretString::from(
            "a-long-enough-test-secret-value".to_owned(),
        )));
        let controller = Arc::new(ReleaseController::new(
            Arc::clone(&store),
            queue.clone(),
            codec,
            Arc::new(WebhookDispatcher::new(None)),
        ));

        let event_id = EventId::new("concert");
        let mut config = EventConfig::default();
        config.release_rate_per_second = 5;
        queue.set_event_config(&event_id, &config).await.unwrap();
        let entry = queue
            .enroll(event_id.clone(), DeviceId::new("d1"), EnrollRequest::default())
            .await
            .unwrap();

        let scheduler = ReleaseScheduler::new(store, queue.clone(), controller);
        scheduler.tick().await;

        let status = queue.status(&entry.queue_id).await.unwrap();
        assert_eq!(status.status, gatekeep_core::QueueStatusKind::Admitted);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_skips_paused_events() {
        let store: Arc<dyn StoreAdapter> = Arc::new(MemoryStore::new());
        let queue = QueueManager::new(Arc::clone(&store));
        let codec = TokenCodec::new(KeyRing::single(SecretString::from(
            "a-long-enough-test-secret-value".to_owned(),
        )));
        let controller = Arc::new(ReleaseController::new(
            Arc::clone(&store),
            queue.clone(),
            codec,
            Arc::new(WebhookDispatcher::new(None)),
        ));

        let event_id = EventId::new("concert");
        let entry = queue
            .enroll(event_id.clone(), DeviceId::new("d1"), EnrollRequest::default())
            .await
            .unwrap();
        controller.pause(&event_id).await.unwrap();

        let scheduler = ReleaseScheduler::new(store, queue.clone(), controller);
        scheduler.tick().await;

        let status = queue.status(&entry.queue_id).await.unwrap();
        assert_eq!(status.status, gatekeep_core::QueueStatusKind::Waiting);
    }
}
