//! Fixed-window rate limiting (§4.C): enrollment throttling per
//! `(device_id, event_id)`, and the same shape reused for per-IP and
//! per-user HTTP limiters.

mod error;
mod limiter;

pub use error::RateLimitError;
pub use limiter::{RateLimitDecision, RateLimiter};
