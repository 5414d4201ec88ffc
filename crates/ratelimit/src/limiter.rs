use std::time::Duration;

use gatekeep_state::StoreAdapter;

use crate::error::RateLimitError;

/// Outcome of a [`RateLimiter::check_and_increment`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after_seconds: u64 },
}

impl RateLimitDecision {
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Fixed-window counter rate limiter (§4.C).
///
/// One limiter instance is reused for every caller that needs this shape:
/// the per-`(device_id, event_id)` enrollment throttle, and — with a
/// different key and threshold, outside the formal store key schema — the
/// per-IP and per-user HTTP limiters in the server layer.
pub struct RateLimiter<'a> {
    store: &'a dyn StoreAdapter,
}

impl<'a> RateLimiter<'a> {
    #[must_use]
    pub fn new(store: &'a dyn StoreAdapter) -> Self {
        Self { store }
    }

    /// Increment `key`'s counter and decide whether it has exceeded `limit`
    /// within the trailing `window`.
    ///
    /// The first increment of a fresh window also sets the key's TTL, so
    /// the window is fixed (not truly sliding) but self-resetting: once the
    /// TTL elapses the counter starts over at zero. Exceeding the limit
    /// still consumes quota — the increment happens unconditionally before
    /// the limit check, so a rejected attempt counts against the caller the
    /// same as an accepted one (§4.C).
    pub async fn check_and_increment(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let count = self.store.incr(key).await?;
        if count == 1 {
            self.store.expire(key, window).await?;
        }

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        if count <= limit {
            return Ok(RateLimitDecision::Allowed);
        }

        let retry_after_seconds = self
            .store
            .ttl_seconds(key)
            .await?
            .and_then(|secs| u64::try_from(secs).ok())
            .unwrap_or_else(|| window.as_secs());

        Ok(RateLimitDecision::Limited {
            retry_after_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeep_state_memory::MemoryStore;

    #[tokio::test]
    async fn allows_up_to_the_limit() {
        let store = MemoryStore::new();
        let limiter = RateLimiter::new(&store);
        for _ in 0..5 {
            let decision = limiter
                .check_and_increment("k", 5, Duration::from_secs(60))
                .await
                .unwrap();
            assert_eq!(decision, RateLimitDecision::Allowed);
        }
    }

    #[tokio::test]
    async fn rejects_past_the_limit_and_still_consumes_quota() {
        let store = MemoryStore::new();
        let limiter = RateLimiter::new(&store);
        for _ in 0..5 {
            limiter
                .check_and_increment("k", 5, Duration::from_secs(60))
                .await
                .unwrap();
        }
        let decision = limiter
            .check_and_increment("k", 5, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(matches!(decision, RateLimitDecision::Limited { .. }));

        // still over the limit, and quota keeps being consumed
        let decision = limiter
            .check_and_increment("k", 5, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(matches!(decision, RateLimitDecision::Limited { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_ttl_elapses() {
        let store = MemoryStore::new();
        let limiter = RateLimiter::new(&store);
        for _ in 0..5 {
            limiter
                .check_and_increment("k", 5, Duration::from_secs(60))
                .await
                .unwrap();
        }
        assert!(matches!(
            limiter
                .check_and_increment("k", 5, Duration::from_secs(60))
                .await
                .unwrap(),
            RateLimitDecision::Limited { .. }
        ));

        tokio::time::advance(Duration::from_secs(61)).await;

        let decision = limiter
            .check_and_increment("k", 5, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(decision, RateLimitDecision::Allowed);
    }

    #[tokio::test]
    async fn retry_after_reflects_remaining_ttl() {
        let store = MemoryStore::new();
        let limiter = RateLimiter::new(&store);
        limiter
            .check_and_increment("k", 1, Duration::from_secs(30))
            .await
            .unwrap();
        let decision = limiter
            .check_and_increment("k", 1, Duration::from_secs(30))
            .await
            .unwrap();
        match decision {
            RateLimitDecision::Limited {
                retry_after_seconds,
            } => assert!(retry_after_seconds <= 30),
            RateLimitDecision::Allowed => panic!("expected limited decision"),
        }
    }
}
