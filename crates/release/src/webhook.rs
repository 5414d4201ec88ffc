use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::warn;

use gatekeep_core::{DeviceId, EventId, QueueId, UserId};

type HmacSha256 = Hmac<Sha256>;

const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// Payload posted to a configured `webhook_url` on admission (§6).
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionWebhookPayload {
    pub event: &'static str,
    pub event_id: EventId,
    pub device_id: DeviceId,
    pub user_id: UserId,
    pub token: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub queue_id: QueueId,
}

/// Dispatches the admission webhook, signing the body with an HMAC header
/// when a secret is configured. Best-effort: failures are logged and never
/// surfaced to the enrollment caller (§4.E step 5.f).
pub struct WebhookDispatcher {
    client: reqwest::Client,
    hmac_secret: Option<String>,
}

impl WebhookDispatcher {
    #[must_use]
    pub fn new(hmac_secret: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("failed to build HTTP client"),
            hmac_secret,
        }
    }

    fn compute_hmac(secret: &str, body: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any length");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    /// POST `payload` to `url`, retrying up to 3 times on failure with 1 s,
    /// 2 s, 4 s backoff. Never returns an error; every outcome is logged.
    pub async fn dispatch(&self, url: &str, payload: &AdmissionWebhookPayload) {
        let Ok(body) = serde_json::to_vec(payload) else {
            warn!(%url, "failed to serialize admission webhook payload");
            return;
        };

        for (attempt, delay) in std::iter::once(None)
            .chain(RETRY_DELAYS.into_iter().map(Some))
            .enumerate()
        {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .body(body.clone());

            if let Some(secret) = &self.hmac_secret {
                let signature = Self::compute_hmac(secret, &body);
                request = request.header("X-Gatekeep-Signature", format!("sha256={signature}"));
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => return,
                Ok(response) => {
                    warn!(%url, attempt, status = %response.status(), "admission webhook rejected");
                }
                Err(err) => {
                    warn!(%url, attempt, error = %err, "admission webhook request failed");
                }
            }
        }

        warn!(%url, "admission webhook exhausted retry budget");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_signature_is_deterministic() {
        let sig1 = WebhookDispatcher::compute_hmac("secret", b"body");
        let sig2 = WebhookDispatcher::compute_hmac("secret", b"body");
        assert_eq!(sig1, sig2);
        assert_ne!(sig1, WebhookDispatcher::compute_hmac("other", b"body"));
    }
}
