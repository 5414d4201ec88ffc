use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! newtype_string {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(EventId, "Identifies a throttled event (one admission queue).");
newtype_string!(DeviceId, "Client device identifier used for idempotency and rate limiting.");
newtype_string!(UserId, "Optional end-user identifier carried through to the admission token.");
newtype_string!(QueueId, "Opaque unique identifier for a single queue entry.");

impl QueueId {
    /// Generate a fresh, URL-safe 128-bit random identifier (§4.D step 6).
    #[must_use]
    pub fn generate() -> Self {
        Self(random_urlsafe_token())
    }
}

/// Generate a 128-bit random value, base64url (no padding) encoded.
///
/// Shared by queue ID and token nonce generation so both draw from the same
/// CSPRNG source (`rand_core::OsRng`).
#[must_use]
pub fn random_urlsafe_token() -> String {
    use base64::Engine;
    use rand_core::RngCore;

    let mut bytes = [0u8; 16];
    rand_core::OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_from_str() {
        let id = EventId::from("black-friday");
        assert_eq!(id.as_str(), "black-friday");
    }

    #[test]
    fn newtype_from_string() {
        let id = DeviceId::from(String::from("device-1"));
        assert_eq!(id.as_str(), "device-1");
    }

    #[test]
    fn newtype_serde_roundtrip() {
        let id = QueueId::new("q-123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"q-123\"");
        let back: QueueId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn newtype_display() {
        let id = UserId::new("u-1");
        assert_eq!(format!("{id}"), "u-1");
    }

    #[test]
    fn newtype_deref_and_as_ref() {
        let id = EventId::new("e-1");
        assert_eq!(id.len(), 3);
        assert_eq!(id.as_ref(), "e-1");
    }
}
