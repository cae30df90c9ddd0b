//! Pure data types for the Verdant controller.
//!
//! This crate contains only data types and serialization: no I/O, no async,
//! no transport. It defines the shared language between the controller's
//! tasks and its external channels (cloud and local radio).

mod command;
mod frames;
mod manifest;
mod schedule;
mod status;

pub use command::{Actor, Command, MAX_PERCENT};
pub use frames::{ControlFrame, HandshakeFrame, ProvisioningFrame, HANDSHAKE_CMD};
pub use manifest::{Manifest, DIGEST_HEX_LEN};
pub use schedule::{PumpCycle, ScheduleConfig, MAX_TZ_LEN};
pub use status::{ResetReason, UpdateStatus};

use thiserror::Error;

/// Validation errors for wire-level types.
#[derive(Error, Debug)]
pub enum TypeError {
    #[error("Invalid field: {0}")]
    InvalidField(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for type-level validation.
pub type TypeResult<T> = Result<T, TypeError>;
