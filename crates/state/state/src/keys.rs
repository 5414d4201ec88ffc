//! The store key schema (§6).
//!
//! Centralizing key construction here means the queue manager, release
//! controller, rate limiter, and token codec never hand-assemble a key
//! string — they call one of these functions and the schema only needs to
//! change in one place.

/// `queue:entry:{queue_id}` — a queue entry record.
#[must_use]
pub fn entry(queue_id: &str) -> String {
    format!("queue:entry:{queue_id}")
}

/// `queue:list:{event_id}` — the FIFO `normal` queue.
#[must_use]
pub fn normal_list(event_id: &str) -> String {
    format!("queue:list:{event_id}")
}

/// `queue:zset:{event_id}` — the score-ordered `high` queue.
#[must_use]
pub fn priority_zset(event_id: &str) -> String {
    format!("queue:zset:{event_id}")
}

/// `queue:config:{event_id}` — per-event configuration.
#[must_use]
pub fn event_config(event_id: &str) -> String {
    format!("queue:config:{event_id}")
}

/// `queue:admitted:{event_id}` — the admitted set.
#[must_use]
pub fn admitted_set(event_id: &str) -> String {
    format!("queue:admitted:{event_id}")
}

/// `queue:ratelimit:{device_id}:{event_id}` — the enrollment throttle counter.
#[must_use]
pub fn rate_limit_counter(device_id: &str, event_id: &str) -> String {
    format!("queue:ratelimit:{device_id}:{event_id}")
}

/// `queue:device:event:{device_id}:{event_id}` — the idempotency mapping.
#[must_use]
pub fn idempotency(device_id: &str, event_id: &str) -> String {
    format!("queue:device:event:{device_id}:{event_id}")
}

/// `token:{token_string_or_hash}` — admission token metadata.
#[must_use]
pub fn token_metadata(token_hash: &str) -> String {
    format!("token:{token_hash}")
}

/// `release:state` (global) or `release:state:{event_id}` (per-event).
#[must_use]
pub fn release_state(event_id: Option<&str>) -> String {
    match event_id {
        Some(id) => format!("release:state:{id}"),
        None => "release:state".to_owned(),
    }
}

/// `queue:active_events` — the explicit active-event index (§9 Open Questions,
/// resolved in favor of an explicit set written on first enrollment rather
/// than a keyspace scan).
#[must_use]
pub fn active_events() -> &'static str {
    "queue:active_events"
}

/// `queue:issued_token:{queue_id}` — the raw admission token string for an
/// already-minted entry, TTL'd to the token's own lifetime.
///
/// Not part of the formal §6 key schema (which only persists the token's
/// *hash* for revocation). The release controller writes this alongside
/// that metadata record so that a later `Heartbeat` call — which observes
/// admission only after the fact, never at mint time — has something to
/// hand the client (§4.D Heartbeat: "admission_token if admitted").
#[must_use]
pub fn issued_token(queue_id: &str) -> String {
    format!("queue:issued_token:{queue_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_documented_patterns() {
        assert_eq!(entry("q1"), "queue:entry:q1");
        assert_eq!(normal_list("e1"), "queue:list:e1");
        assert_eq!(priority_zset("e1"), "queue:zset:e1");
        assert_eq!(event_config("e1"), "queue:config:e1");
        assert_eq!(admitted_set("e1"), "queue:admitted:e1");
        assert_eq!(rate_limit_counter("d1", "e1"), "queue:ratelimit:d1:e1");
        assert_eq!(idempotency("d1", "e1"), "queue:device:event:d1:e1");
        assert_eq!(token_metadata("abc"), "token:abc");
        assert_eq!(release_state(None), "release:state");
        assert_eq!(release_state(Some("e1")), "release:state:e1");
        assert_eq!(active_events(), "queue:active_events");
        assert_eq!(issued_token("q1"), "queue:issued_token:q1");
    }
}
