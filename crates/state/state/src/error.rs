use thiserror::Error;

/// Errors from the store adapter (§4.A).
///
/// Every operation has a bounded deadline (2-5s); exhausted deadlines and
/// connectivity failures both surface as [`StoreError::Unavailable`] once the
/// circuit breaker has classified them (see [`crate::circuit::CircuitBreakingStore`]).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend is unreachable, or the circuit is open.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The operation's deadline elapsed before the backend responded.
    #[error("store operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The backend returned an error that isn't connectivity-related.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored value could not be decoded into the expected shape.
    #[error("store serialization error: {0}")]
    Serialization(String),
}
