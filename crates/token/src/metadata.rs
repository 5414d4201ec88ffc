use std::time::Duration;

use serde::{Deserialize, Serialize};

use gatekeep_state::{keys, StoreAdapter};

use crate::error::TokenError;

#[derive(Debug, Serialize, Deserialize)]
struct Record {
    revoked: bool,
}

/// Revocation metadata for admission tokens, keyed by a hash of the token
/// string (§6: `token:{token_string_or_hash}`).
///
/// Absence of a metadata record is not an error: the signature is the
/// source of truth, and the record exists only to support revocation.
pub struct TokenMetadataStore<'a> {
    store: &'a dyn StoreAdapter,
}

impl<'a> TokenMetadataStore<'a> {
    #[must_use]
    pub fn new(store: &'a dyn StoreAdapter) -> Self {
        Self { store }
    }

    /// Record that a token was issued, with TTL matching its remaining
    /// lifetime (§4.B Sign).
    pub async fn record_issued(&self, token_hash: &str, ttl: Duration) -> Result<(), TokenError> {
        let body = serde_json::to_string(&Record { revoked: false })?;
        self.store
            .set_string(&keys::token_metadata(token_hash), &body, Some(ttl))
            .await?;
        Ok(())
    }

    pub async fn is_revoked(&self, token_hash: &str) -> Result<bool, TokenError> {
        match self
            .store
            .get_string(&keys::token_metadata(token_hash))
            .await?
        {
            Some(body) => Ok(serde_json::from_str::<Record>(&body)?.revoked),
            None => Ok(false),
        }
    }

    /// Flip a token's metadata record to revoked, preserving remaining TTL
    /// (§4.B Revoke).
    pub async fn revoke(&self, token_hash: &str) -> Result<(), TokenError> {
        let key = keys::token_metadata(token_hash);
        let remaining_ttl = self
            .store
            .ttl_seconds(&key)
            .await?
            .map(|secs| Duration::from_secs(u64::try_from(secs.max(0)).unwrap_or(0)));
        let body = serde_json::to_string(&Record { revoked: true })?;
        self.store.set_string(&key, &body, remaining_ttl).await?;
        Ok(())
    }
}
