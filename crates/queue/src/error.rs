use thiserror::Error;

/// Errors from the Queue Manager (§4.D).
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("queue disabled for event {event_id}")]
    QueueDisabled { event_id: String },

    #[error("queue full for event {event_id}")]
    QueueFull { event_id: String },

    #[error("rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("store error: {0}")]
    Store(#[from] gatekeep_state::StoreError),

    #[error("rate limit error: {0}")]
    RateLimit(#[from] gatekeep_ratelimit::RateLimitError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<QueueError> for gatekeep_core::GatekeepError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Validation(msg) => Self::Validation(msg),
            QueueError::NotFound(msg) => Self::NotFound(msg),
            QueueError::QueueDisabled { event_id } => Self::QueueDisabled { event_id },
            QueueError::QueueFull { event_id } => Self::QueueFull { event_id },
            QueueError::RateLimited {
                retry_after_seconds,
            } => Self::RateLimited {
                retry_after_seconds,
            },
            QueueError::Store(e) => Self::StoreUnavailable(e.to_string()),
            QueueError::RateLimit(e) => Self::StoreUnavailable(e.to_string()),
            QueueError::Serialization(e) => Self::Internal(e.to_string()),
        }
    }
}
