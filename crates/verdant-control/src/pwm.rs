//! PWM peripheral seam.

use crate::ControlResult;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// The actuator peripheral as the pipeline sees it.
///
/// Implementations program both channels together; `steps` is the software
/// ramp plan when the hardware cannot fade on its own (0 = hard switch).
pub trait PwmBackend: Send {
    fn apply(&mut self, light_percent: u8, pump_percent: u8, ramp_ms: u32, steps: u32)
        -> ControlResult<()>;
}

/// One programmed duty change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedDuty {
    pub light_percent: u8,
    pub pump_percent: u8,
    pub ramp_ms: u32,
    pub steps: u32,
}

/// Recording backend for tests, with injectable failures.
#[derive(Default)]
pub struct MemoryPwm {
    log: Arc<Mutex<Vec<AppliedDuty>>>,
    fail_next: Arc<AtomicU32>,
}

impl MemoryPwm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the applied-duty log.
    pub fn log(&self) -> Arc<Mutex<Vec<AppliedDuty>>> {
        self.log.clone()
    }

    /// Fail the next `count` apply calls.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }
}

impl PwmBackend for MemoryPwm {
    fn apply(
        &mut self,
        light_percent: u8,
        pump_percent: u8,
        ramp_ms: u32,
        steps: u32,
    ) -> ControlResult<()> {
        let pending = self.fail_next.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next.store(pending - 1, Ordering::SeqCst);
            return Err(crate::ControlError::Peripheral("injected failure".into()));
        }
        self.log.lock().unwrap().push(AppliedDuty {
            light_percent,
            pump_percent,
            ramp_ms,
            steps,
        });
        Ok(())
    }
}
