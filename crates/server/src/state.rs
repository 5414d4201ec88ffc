//! Shared application state handed to every request handler.

use std::sync::Arc;

use secrecy::SecretString;

use gatekeep_queue::QueueManager;
use gatekeep_release::ReleaseController;
use gatekeep_state::StoreAdapter;
use gatekeep_token::{KeyRing, TokenCodec};

use crate::metrics::Metrics;

/// Everything a handler needs: the queue manager and release controller
/// (both cheap to clone), a direct store handle for the one read the queue
/// manager doesn't expose (the issued-token lookup for `Heartbeat`), the
/// token codec for standalone verification, the admin key, and the process
/// metrics.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StoreAdapter>,
    pub queue: QueueManager,
    pub release: Arc<ReleaseController>,
    pub token_codec: Arc<TokenCodec>,
    pub admin_api_key: SecretString,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    #[must_use]
    pub fn new(
        store: Arc<dyn StoreAdapter>,
        queue: QueueManager,
        release: Arc<ReleaseController>,
        keyring: KeyRing,
        admin_api_key: SecretString,
    ) -> Self {
        Self {
            store,
            queue,
            release,
            token_codec: Arc::new(TokenCodec::new(keyring)),
            admin_api_key,
            metrics: Arc::new(Metrics::new()),
        }
    }
}
