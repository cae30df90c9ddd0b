//! Shared runtime fabric for the Verdant controller.
//!
//! Holds the three process-wide primitives every task cooperates through:
//! the link-state event bits, the bounded audit sink, and the task-liveness
//! registry the safety watchdog reads. No business logic lives here.

mod audit;
mod bits;
mod liveness;

pub use audit::{audit_channel, AuditQueue, AuditSink, MAX_AUDIT_LINE};
pub use bits::{
    LinkBits, CLOUD_SESSION_UP, LOCAL_CHANNEL_ACTIVE, SHUTDOWN, TIME_SYNCED, WIFI_UP,
};
pub use liveness::{Liveness, LivenessToken};

use thiserror::Error;

/// Errors from the runtime fabric.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RuntimeError {
    /// A bounded queue was full and the send deadline is now.
    #[error("Queue full")]
    Timeout,
    /// The consumer side is gone.
    #[error("Channel closed")]
    Closed,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
