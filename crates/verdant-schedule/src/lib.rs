//! Schedule engine for the Verdant controller.
//!
//! Decides whether the light should currently be on, computes the next
//! on/off instants through the configured timezone, collapses missed
//! transitions across reboots into a single correction, and superimposes
//! the pump duty cycle.

mod engine;
mod eval;

pub use engine::{ScheduleEngine, TICK_CHUNK};
pub use eval::{is_light_on, next_off, next_on, pump_is_on, reconcile};

use thiserror::Error;

/// Errors from schedule evaluation.
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),
    #[error("Invalid schedule configuration: {0}")]
    InvalidConfig(String),
    /// The requested local time cannot be represented (calendar overflow).
    #[error("Time computation overflow")]
    Overflow,
}

/// Result type for schedule operations.
pub type ScheduleResult<T> = Result<T, ScheduleError>;
