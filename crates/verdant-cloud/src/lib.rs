//! Cloud-link plumbing for the Verdant controller.
//!
//! The MQTT client itself is an external collaborator behind [`CloudLink`];
//! this crate owns the topic layout, the jobs/notify-next routing (manifest
//! extraction, legacy-path gating), and the shadow `reported` document.

mod jobs;
mod link;
mod router;
mod shadow;
mod topics;

pub use jobs::route_job;
pub use link::{CloudEvent, CloudLink, CloudMessage, MemoryCloud};
pub use router::CloudRouter;
pub use shadow::{shadow_document, ReportedState};
pub use topics::{
    audit_topic, heartbeat_topic, jobs_notify_subscription, matches_jobs_notify,
    shadow_update_topic,
};

use thiserror::Error;

/// Errors from cloud-message handling.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Invalid cloud message: {0}")]
    InvalidMessage(String),
    /// Legacy `ota_url` job received with the compatibility flag off.
    #[error("Legacy job path disabled")]
    LegacyDisabled,
    /// Legacy job signature did not verify against the device certificate.
    #[error("Unauthorized cloud message")]
    Unauthorized,
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for cloud operations.
pub type CloudResult<T> = Result<T, CloudError>;
