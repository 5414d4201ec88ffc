use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// One operation inside a [`StoreAdapter::pipeline`] batch.
///
/// Pipelines batch several writes that should be sent together — enrollment
/// (entry + queue push + idempotency mapping) and the rate limiter's
/// increment-then-expire pair are the two call sites in this service.
/// Per §4.A, a pipeline is a batch, not a transaction: the individual
/// pop/push/zset operations are atomic at the adapter level, but a multi-step
/// pipeline is not guaranteed all-or-nothing.
#[derive(Debug, Clone)]
pub enum PipelineOp {
    SetString {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    ListPushRight {
        key: String,
        value: String,
    },
    ZsetAdd {
        key: String,
        member: String,
        score: f64,
    },
    Incr {
        key: String,
        delta: i64,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
}

/// The result of one [`PipelineOp`], in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineResult {
    Unit,
    Int(i64),
}

/// A narrow, typed surface over an external ordered/hash store (§4.A).
///
/// Implementations must be `Send + Sync`. Every method has an implicit
/// bounded deadline enforced by the caller (see
/// [`crate::circuit::CircuitBreakingStore`]); a backend that hangs rather
/// than erroring will still be bounded once wrapped.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Get a string value. `None` if absent or expired.
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set a string value, overwriting any previous value.
    async fn set_string(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Delete a key of any type. Returns `true` if it existed.
    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    /// Read an entire hash. Empty map if absent.
    async fn get_hash(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Overwrite a hash's fields wholesale, with an optional TTL.
    async fn set_hash(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Append to the tail of a list. Returns the new length.
    async fn list_push_right(&self, key: &str, value: &str) -> Result<i64, StoreError>;

    /// Atomically pop and return the head of a list. `None` if empty.
    async fn list_pop_left(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Current list length (0 if the key doesn't exist).
    async fn list_len(&self, key: &str) -> Result<i64, StoreError>;

    /// Return the full list contents, head to tail.
    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Remove the first occurrence of `value` from the list. Returns `true`
    /// if something was removed.
    async fn list_remove_first(&self, key: &str, value: &str) -> Result<bool, StoreError>;

    /// Add or update a member's score in a sorted set.
    async fn zset_add(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError>;

    /// Atomically pop and return the lowest-scored member. `None` if empty.
    /// Ties break on the member string itself, giving a deterministic
    /// secondary ordering (§5).
    async fn zset_pop_min(&self, key: &str) -> Result<Option<(String, f64)>, StoreError>;

    /// 0-based rank of a member by ascending score. `None` if absent.
    async fn zset_rank(&self, key: &str, member: &str) -> Result<Option<i64>, StoreError>;

    /// Number of members in the sorted set.
    async fn zset_card(&self, key: &str) -> Result<i64, StoreError>;

    /// Remove a member from the sorted set. Returns `true` if it was present.
    async fn zset_remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Add a member to a set. Returns `true` if it was newly added.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Test set membership.
    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Remove a member from a set. Returns `true` if it was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Atomically increment a counter by 1, creating it at 0 first if absent.
    /// Returns the new value.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Set (or refresh) a key's TTL.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Seconds remaining on a key's TTL, if any.
    async fn ttl_seconds(&self, key: &str) -> Result<Option<i64>, StoreError>;

    /// Execute a batch of writes. See [`PipelineOp`] for the atomicity
    /// contract. Results are returned in call order.
    async fn pipeline(&self, ops: &[PipelineOp]) -> Result<Vec<PipelineResult>, StoreError>;

    /// Liveness probe used by the circuit breaker's half-open check.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Object-safety check: a boxed trait object must compile.
    fn _assert_object_safe(_: &dyn StoreAdapter) {}
}
