//! Shared identifiers, domain model, and error taxonomy for Gatekeep.
//!
//! This crate has no I/O of its own. It is the vocabulary that
//! `gatekeep-state`, `gatekeep-token`, `gatekeep-queue`, `gatekeep-release`,
//! and `gatekeep-server` all speak so that a `QueueEntry` built by the queue
//! manager is the same `QueueEntry` a handler serializes to JSON.

pub mod error;
pub mod ids;
pub mod model;

pub use error::GatekeepError;
pub use ids::{DeviceId, EventId, QueueId, UserId, random_urlsafe_token};
pub use model::{
    EventConfig, PriorityBucket, QueueEntry, QueueStatusKind, ReleaseState, StatusView,
};
