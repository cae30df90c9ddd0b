//! Control pipeline for the Verdant controller.
//!
//! Every actuator change in the device flows through one bounded queue and
//! one consumer task, which is the sole writer of the PWM peripheral. A
//! dedicated urgent slot lets the safety path preempt anything queued.

mod pipeline;
mod pwm;
mod queue;
mod ramp;
mod snapshot;

pub use pipeline::ControlPipeline;
pub use pwm::{AppliedDuty, MemoryPwm, PwmBackend};
pub use queue::{safety_shutdown, CommandQueue, DEFAULT_QUEUE_CAPACITY};
pub use ramp::{ramp_steps, DEFAULT_STEP_MS};
pub use snapshot::{ActuatorSnapshot, SharedSnapshot};

use thiserror::Error;

/// Errors from the control pipeline.
#[derive(Error, Debug)]
pub enum ControlError {
    /// The PWM peripheral rejected a duty or ramp program.
    #[error("Peripheral error: {0}")]
    Peripheral(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for control operations.
pub type ControlResult<T> = Result<T, ControlError>;
