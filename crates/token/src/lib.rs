//! Self-contained HMAC-signed admission tokens (§4.B): sign, verify, revoke,
//! and the key ring that makes secret rotation possible without invalidating
//! tokens already in flight.

mod codec;
mod error;
mod keyring;
mod metadata;

pub use codec::{TokenCodec, TokenPayload, VerifiedToken};
pub use error::TokenError;
pub use keyring::{KeyRing, SigningKey};
pub use metadata::TokenMetadataStore;
