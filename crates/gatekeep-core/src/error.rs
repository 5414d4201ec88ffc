use thiserror::Error;

/// The top-level error taxonomy realized at the HTTP boundary (§7).
///
/// Every component crate (`gatekeep-state`, `gatekeep-token`, `gatekeep-queue`,
/// `gatekeep-release`) defines its own scoped error enum; this type is what
/// those errors are converted into once they reach a request handler, where
/// each variant maps to exactly one HTTP status code.
#[derive(Debug, Error)]
pub enum GatekeepError {
    /// Missing or ill-formed request fields.
    #[error("validation error: {0}")]
    Validation(String),

    /// `queue_id` unknown, or the entry's TTL has expired.
    #[error("not found: {0}")]
    NotFound(String),

    /// The entry existed, was admitted, and the token has since expired.
    #[error("gone: {0}")]
    Gone(String),

    /// A conflicting priority-bucket re-enrollment attempt.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Enrollment throttle exceeded.
    #[error("rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    /// The event is not currently accepting enrollments.
    #[error("queue disabled for event {event_id}")]
    QueueDisabled { event_id: String },

    /// The event's queue has reached `max_queue_size`.
    #[error("queue full for event {event_id}")]
    QueueFull { event_id: String },

    /// The release controller is paused for this event (or globally).
    #[error("release paused for event {event_id}")]
    Paused { event_id: String },

    /// `max_concurrent_admissions` has been reached.
    #[error("capacity reached for event {event_id}")]
    CapacityReached { event_id: String },

    /// Admin auth missing or mismatched.
    #[error("unauthorized")]
    Unauthorized,

    /// The shared store is unreachable or its circuit is open.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Anything else. Never surfaced verbatim; logged with a correlation ID.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatekeepError {
    /// A short, stable machine-readable tag for this error kind, used in
    /// JSON error bodies and log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Gone(_) => "gone",
            Self::Conflict(_) => "conflict",
            Self::RateLimited { .. } => "rate_limited",
            Self::QueueDisabled { .. } => "queue_disabled",
            Self::QueueFull { .. } => "queue_full",
            Self::Paused { .. } => "paused",
            Self::CapacityReached { .. } => "capacity_reached",
            Self::Unauthorized => "unauthorized",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_stable_per_variant() {
        assert_eq!(GatekeepError::Validation("x".into()).kind(), "validation_error");
        assert_eq!(
            GatekeepError::RateLimited {
                retry_after_seconds: 5
            }
            .kind(),
            "rate_limited"
        );
        assert_eq!(GatekeepError::Unauthorized.kind(), "unauthorized");
    }
}
