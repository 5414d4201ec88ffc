use thiserror::Error;

/// Errors from the Release Controller (§4.E).
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("release paused for event {event_id}")]
    Paused { event_id: String },

    #[error("capacity reached for event {event_id}")]
    CapacityReached { event_id: String },

    #[error("store error: {0}")]
    Store(#[from] gatekeep_state::StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] gatekeep_queue::QueueError),

    #[error("token error: {0}")]
    Token(#[from] gatekeep_token::TokenError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ReleaseError> for gatekeep_core::GatekeepError {
    fn from(err: ReleaseError) -> Self {
        match err {
            ReleaseError::Paused { event_id } => Self::Paused { event_id },
            ReleaseError::CapacityReached { event_id } => Self::CapacityReached { event_id },
            ReleaseError::Store(e) => Self::StoreUnavailable(e.to_string()),
            ReleaseError::Queue(e) => gatekeep_core::GatekeepError::from(e),
            ReleaseError::Token(e) => gatekeep_core::GatekeepError::from(e),
            ReleaseError::Serialization(e) => Self::Internal(e.to_string()),
        }
    }
}
