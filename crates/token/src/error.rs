use thiserror::Error;

/// Errors from signing and verifying admission tokens (§4.B).
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("bad signature")]
    BadSignature,

    #[error("token event_id does not match")]
    EventMismatch,

    #[error("token expired")]
    Expired,

    #[error("token revoked")]
    Revoked,

    #[error("token store error: {0}")]
    Store(#[from] gatekeep_state::StoreError),

    #[error("token serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<TokenError> for gatekeep_core::GatekeepError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed(msg) => Self::Validation(format!("malformed token: {msg}")),
            TokenError::BadSignature => Self::Validation("bad token signature".to_owned()),
            TokenError::EventMismatch => Self::Validation("token event_id mismatch".to_owned()),
            TokenError::Expired | TokenError::Revoked => {
                Self::Gone(err.to_string())
            }
            TokenError::Store(e) => Self::StoreUnavailable(e.to_string()),
            TokenError::Serialization(e) => Self::Internal(e.to_string()),
        }
    }
}
