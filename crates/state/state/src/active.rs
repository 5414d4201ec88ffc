//! The explicit active-event index consulted by the release scheduler
//! instead of a keyspace scan (§4.E Scheduler loop, §9 Open Questions).
//!
//! Backed by a list rather than a set because [`crate::StoreAdapter`] has no
//! set-enumeration primitive. The check-then-push below is not atomic, so
//! two instances racing to mark the same event active may each push once;
//! the list is only ever read for membership, never popped, so a duplicate
//! costs one redundant `Release` call on the next scheduler tick and is
//! otherwise harmless.

use crate::error::StoreError;
use crate::keys;
use crate::store::StoreAdapter;

/// Record `event_id` as active if it isn't already present.
pub async fn mark_event_active(store: &dyn StoreAdapter, event_id: &str) -> Result<(), StoreError> {
    let existing = store.list_range(keys::active_events()).await?;
    if !existing.iter().any(|id| id == event_id) {
        store.list_push_right(keys::active_events(), event_id).await?;
    }
    Ok(())
}

/// Every event_id ever marked active on this store, deduplicated.
pub async fn active_event_ids(store: &dyn StoreAdapter) -> Result<Vec<String>, StoreError> {
    let mut ids = store.list_range(keys::active_events()).await?;
    ids.sort();
    ids.dedup();
    Ok(ids)
}

