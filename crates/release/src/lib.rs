//! The Release Controller (§4.E): rate- and capacity-gated admission out of
//! the queue, pause/resume, and the 1 Hz scheduler that drives it across
//! every event this process has observed.

mod controller;
mod error;
mod scheduler;
mod webhook;

pub use controller::ReleaseController;
pub use error::ReleaseError;
pub use scheduler::ReleaseScheduler;
pub use webhook::{AdmissionWebhookPayload, WebhookDispatcher};
