use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// A named signing key. `name` is operational metadata for logging during
/// rotation; it plays no part in the wire format. Per §4.B, the secret must
/// be at least 32 bytes (enforced at startup, not here — this type accepts
/// whatever it's given so tests can exercise short keys).
#[derive(Clone)]
pub struct SigningKey {
    pub name: String,
    pub secret: SecretString,
}

impl SigningKey {
    #[must_use]
    pub fn new(name: impl Into<String>, secret: SecretString) -> Self {
        Self {
            name: name.into(),
            secret,
        }
    }
}

/// An ordered list of keys: the first is the current signing key. Every key
/// in the ring is tried during verification, so a rotation can prepend a new
/// key while the old one still verifies tokens it already issued (§4.B Key
/// constraints).
#[derive(Clone)]
pub struct KeyRing {
    keys: Vec<SigningKey>,
}

impl KeyRing {
    /// Build a key ring from a non-empty list, current signing key first.
    ///
    /// # Panics
    ///
    /// Panics if `keys` is empty.
    #[must_use]
    pub fn new(keys: Vec<SigningKey>) -> Self {
        assert!(!keys.is_empty(), "key ring must contain at least one key");
        Self { keys }
    }

    /// A single-key ring, for the common case of no rotation in flight.
    #[must_use]
    pub fn single(secret: SecretString) -> Self {
        Self::new(vec![SigningKey::new("default", secret)])
    }

    fn mac_for(secret: &SecretString) -> Result<HmacSha256, hmac::digest::InvalidLength> {
        HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
    }

    /// Sign with the current (first) key.
    ///
    /// # Panics
    ///
    /// Panics if the current key fails to initialize as an HMAC key, which
    /// cannot happen for `Hmac<Sha256>` (it accepts keys of any length).
    #[must_use]
    pub fn sign(&self, input: &[u8]) -> Vec<u8> {
        let current = &self.keys[0];
        let mut mac =
            Self::mac_for(&current.secret).expect("HMAC-SHA256 accepts keys of any length");
        mac.update(input);
        mac.finalize().into_bytes().to_vec()
    }

    /// Constant-time verify against every key in the ring; `true` on the
    /// first match.
    #[must_use]
    pub fn verify_any(&self, input: &[u8], signature: &[u8]) -> bool {
        self.keys.iter().any(|key| {
            let Ok(mut mac) = Self::mac_for(&key.secret) else {
                return false;
            };
            mac.update(input);
            let expected = mac.finalize().into_bytes();
            bool::from(expected.as_slice().ct_eq(signature))
        })
    }

    /// Name of the key that would currently be used for signing.
    #[must_use]
    pub fn current_key_name(&self) -> &str {
        &self.keys[0].name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(secret: &str) -> SecretString {
        SecretString::from(secret.to_owned())
    }

    #[test]
    fn signs_and_verifies_with_same_key() {
        let ring = KeyRing::single(key("a-long-enough-test-secret-value"));
        let sig = ring.sign(b"hello");
        assert!(ring.verify_any(b"hello", &sig));
    }

    #[test]
    fn rejects_wrong_signature() {
        let ring = KeyRing::single(key("a-long-enough-test-secret-value"));
        let sig = ring.sign(b"hello");
        assert!(!ring.verify_any(b"goodbye", &sig));
    }

    #[test]
    fn rotation_verifies_against_retired_key() {
        let old = key("old-signing-secret-value-12345");
        let new = key("new-signing-secret-value-67890");
        let signed_with_old = KeyRing::single(old.clone());
        let sig = signed_with_old.sign(b"payload");

        let rotated = KeyRing::new(vec![
            SigningKey::new("new", new),
            SigningKey::new("old", old),
        ]);
        assert!(rotated.verify_any(b"payload", &sig));
        assert_eq!(rotated.current_key_name(), "new");
    }

    #[test]
    fn rejects_signature_of_different_length() {
        let ring = KeyRing::single(key("a-long-enough-test-secret-value"));
        assert!(!ring.verify_any(b"hello", b"short"));
    }
}
