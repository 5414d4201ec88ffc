use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::warn;

use crate::error::StoreError;
use crate::store::{PipelineOp, PipelineResult, StoreAdapter};

/// Default deadline applied to every store operation (§4.A: "2-5s").
const DEFAULT_DEADLINE: Duration = Duration::from_secs(3);

/// Default time the circuit stays open before a half-open probe (§4.A: `Δ_open`).
const DEFAULT_OPEN_DURATION: Duration = Duration::from_secs(30);

/// Consecutive failures before the circuit trips open (§4.A).
const FAILURE_THRESHOLD: u32 = 3;

#[derive(Debug)]
enum CircuitState {
    Closed,
    Open { since: Instant },
    HalfOpen,
}

/// Wraps any [`StoreAdapter`] with a bounded deadline per call and a
/// three-consecutive-failures circuit breaker (§4.A Failure model).
///
/// While open, every call fails fast with [`StoreError::Unavailable`] without
/// touching the inner backend. After `open_duration` elapses, the next call
/// is let through as a half-open probe: success closes the circuit, failure
/// re-opens it for another `open_duration`.
pub struct CircuitBreakingStore<S> {
    inner: S,
    deadline: Duration,
    open_duration: Duration,
    consecutive_failures: AtomicU32,
    state: Mutex<CircuitState>,
}

impl<S: StoreAdapter> CircuitBreakingStore<S> {
    /// Wrap `inner` with the default deadline (3s) and open duration (30s).
    pub fn new(inner: S) -> Self {
        Self::with_config(inner, DEFAULT_DEADLINE, DEFAULT_OPEN_DURATION)
    }

    pub fn with_config(inner: S, deadline: Duration, open_duration: Duration) -> Self {
        Self {
            inner,
            deadline,
            open_duration,
            consecutive_failures: AtomicU32::new(0),
            state: Mutex::new(CircuitState::Closed),
        }
    }

    /// `true` if a call may currently be attempted against the backend.
    fn may_attempt(&self) -> bool {
        let mut state = self.state.lock().expect("circuit state lock poisoned");
        match *state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open { since } => {
                if since.elapsed() >= self.open_duration {
                    *state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let mut state = self.state.lock().expect("circuit state lock poisoned");
        *state = CircuitState::Closed;
    }

    fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= FAILURE_THRESHOLD {
            let mut state = self.state.lock().expect("circuit state lock poisoned");
            if !matches!(*state, CircuitState::Open { .. }) {
                warn!(failures, "store circuit breaker tripped open");
            }
            *state = CircuitState::Open {
                since: Instant::now(),
            };
        }
    }

    async fn guarded<T, F>(&self, op_name: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        if !self.may_attempt() {
            return Err(StoreError::Unavailable(format!(
                "circuit open, failing fast for {op_name}"
            )));
        }

        match tokio::time::timeout(self.deadline, fut).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record_failure();
                Err(err)
            }
            Err(_) => {
                self.record_failure();
                Err(StoreError::Timeout(self.deadline))
            }
        }
    }
}

#[async_trait]
impl<S: StoreAdapter> StoreAdapter for CircuitBreakingStore<S> {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.guarded("get_string", self.inner.get_string(key)).await
    }

    async fn set_string(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.guarded("set_string", self.inner.set_string(key, value, ttl))
            .await
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        self.guarded("del", self.inner.del(key)).await
    }

    async fn get_hash(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.guarded("get_hash", self.inner.get_hash(key)).await
    }

    async fn set_hash(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.guarded("set_hash", self.inner.set_hash(key, fields, ttl))
            .await
    }

    async fn list_push_right(&self, key: &str, value: &str) -> Result<i64, StoreError> {
        self.guarded("list_push_right", self.inner.list_push_right(key, value))
            .await
    }

    async fn list_pop_left(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.guarded("list_pop_left", self.inner.list_pop_left(key))
            .await
    }

    async fn list_len(&self, key: &str) -> Result<i64, StoreError> {
        self.guarded("list_len", self.inner.list_len(key)).await
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.guarded("list_range", self.inner.list_range(key)).await
    }

    async fn list_remove_first(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        self.guarded(
            "list_remove_first",
            self.inner.list_remove_first(key, value),
        )
        .await
    }

    async fn zset_add(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        self.guarded("zset_add", self.inner.zset_add(key, member, score))
            .await
    }

    async fn zset_pop_min(&self, key: &str) -> Result<Option<(String, f64)>, StoreError> {
        self.guarded("zset_pop_min", self.inner.zset_pop_min(key))
            .await
    }

    async fn zset_rank(&self, key: &str, member: &str) -> Result<Option<i64>, StoreError> {
        self.guarded("zset_rank", self.inner.zset_rank(key, member))
            .await
    }

    async fn zset_card(&self, key: &str) -> Result<i64, StoreError> {
        self.guarded("zset_card", self.inner.zset_card(key)).await
    }

    async fn zset_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.guarded("zset_remove", self.inner.zset_remove(key, member))
            .await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.guarded("set_add", self.inner.set_add(key, member))
            .await
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.guarded("set_contains", self.inner.set_contains(key, member))
            .await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.guarded("set_remove", self.inner.set_remove(key, member))
            .await
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.guarded("incr", self.inner.incr(key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.guarded("expire", self.inner.expire(key, ttl)).await
    }

    async fn ttl_seconds(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.guarded("ttl_seconds", self.inner.ttl_seconds(key))
            .await
    }

    async fn pipeline(&self, ops: &[PipelineOp]) -> Result<Vec<PipelineResult>, StoreError> {
        self.guarded("pipeline", self.inner.pipeline(ops)).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.guarded("ping", self.inner.ping()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryTestStore;

    #[tokio::test]
    async fn passes_through_on_success() {
        let store = CircuitBreakingStore::new(MemoryTestStore::default());
        store.set_string("k", "v", None).await.unwrap();
        assert_eq!(store.get_string("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn trips_open_after_threshold_and_fails_fast() {
        let store = CircuitBreakingStore::with_config(
            MemoryTestStore::failing(),
            Duration::from_millis(50),
            Duration::from_secs(60),
        );

        for _ in 0..FAILURE_THRESHOLD {
            assert!(store.get_string("k").await.is_err());
        }

        // Circuit should now be open: the backend's `calls` counter must not
        // advance even though we call again.
        let before = store.inner.calls();
        let result = store.get_string("k").await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.inner.calls(), before, "open circuit must not reach backend");
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_probe_closes_circuit_on_success() {
        let store = CircuitBreakingStore::with_config(
            MemoryTestStore::failing(),
            Duration::from_millis(50),
            Duration::from_secs(10),
        );

        for _ in 0..FAILURE_THRESHOLD {
            let _ = store.get_string("k").await;
        }
        assert!(matches!(store.get_string("k").await, Err(StoreError::Unavailable(_))));

        store.inner.stop_failing();
        tokio::time::advance(Duration::from_secs(11)).await;

        // Half-open probe should now reach the backend and succeed.
        store.set_string("k", "v", None).await.unwrap();
        assert_eq!(store.get_string("k").await.unwrap().as_deref(), Some("v"));
    }
}
