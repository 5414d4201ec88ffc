use gatekeep_core::{EventConfig, PriorityBucket};
use gatekeep_state::{keys, StoreAdapter};

use crate::error::QueueError;

/// Compute a live entry's 1-based position and its estimated wait, or
/// `None` if it is no longer present in its queue structure (§4.D Status
/// step 4 — not found there means the caller should treat it as expired).
pub async fn position_and_wait(
    store: &dyn StoreAdapter,
    event_id: &str,
    queue_id: &str,
    bucket: PriorityBucket,
    config: &EventConfig,
) -> Result<Option<(i64, i64)>, QueueError> {
    let rank = match bucket {
        PriorityBucket::High => {
            store
                .zset_rank(&keys::priority_zset(event_id), queue_id)
                .await?
        }
        PriorityBucket::Normal => {
            let members = store.list_range(&keys::normal_list(event_id)).await?;
            members
                .iter()
                .position(|m| m == queue_id)
                .map(|p| i64::try_from(p).unwrap_or(i64::MAX))
        }
    };

    let Some(rank) = rank else {
        return Ok(None);
    };

    let position = rank + 1;
    Ok(Some((position, estimated_wait_seconds(position, bucket, config))))
}

fn estimated_wait_seconds(position: i64, bucket: PriorityBucket, config: &EventConfig) -> i64 {
    if config.release_rate_per_second == 0 {
        return 0;
    }
    let rate = i64::try_from(config.release_rate_per_second).unwrap_or(1).max(1);
    let wait = position.div_ceil(rate);
    match bucket {
        PriorityBucket::High => (wait / 2).max(0),
        PriorityBucket::Normal => wait.max(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_clamps_to_zero() {
        let mut config = EventConfig::default();
        config.release_rate_per_second = 0;
        assert_eq!(estimated_wait_seconds(100, PriorityBucket::Normal, &config), 0);
    }

    #[test]
    fn high_priority_wait_is_halved() {
        let mut config = EventConfig::default();
        config.release_rate_per_second = 10;
        assert_eq!(estimated_wait_seconds(20, PriorityBucket::Normal, &config), 2);
        assert_eq!(estimated_wait_seconds(20, PriorityBucket::High, &config), 1);
    }

    #[test]
    fn wait_rounds_up() {
        let mut config = EventConfig::default();
        config.release_rate_per_second = 3;
        assert_eq!(estimated_wait_seconds(7, PriorityBucket::Normal, &config), 3);
    }
}
