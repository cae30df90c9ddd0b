//! Schedule and pump-cycle configuration blobs.

use crate::{TypeError, TypeResult};
use serde::{Deserialize, Serialize};

/// Upper bound on the stored IANA timezone identifier.
pub const MAX_TZ_LEN: usize = 64;

/// Daily light schedule: local on/off wall-clock times plus timezone.
///
/// Stored in the durable store under `schedule_cfg`; always present
/// (defaults are materialized and written back on first boot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub on_hour: u8,
    pub on_minute: u8,
    pub off_hour: u8,
    pub off_minute: u8,
    /// IANA timezone identifier, e.g. "America/Denver".
    pub tz: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            on_hour: 7,
            on_minute: 0,
            off_hour: 21,
            off_minute: 0,
            tz: "UTC".to_string(),
        }
    }
}

impl ScheduleConfig {
    /// Validate field ranges. Timezone resolution is left to the schedule
    /// engine; here only the bound on the identifier length is enforced.
    pub fn validate(&self) -> TypeResult<()> {
        if self.on_hour > 23 || self.off_hour > 23 {
            return Err(TypeError::InvalidField("hour out of range".into()));
        }
        if self.on_minute > 59 || self.off_minute > 59 {
            return Err(TypeError::InvalidField("minute out of range".into()));
        }
        if self.tz.is_empty() || self.tz.len() > MAX_TZ_LEN {
            return Err(TypeError::InvalidField("timezone identifier length".into()));
        }
        Ok(())
    }

    /// Minute-of-day of the on transition.
    pub fn on_minute_of_day(&self) -> u32 {
        self.on_hour as u32 * 60 + self.on_minute as u32
    }

    /// Minute-of-day of the off transition.
    pub fn off_minute_of_day(&self) -> u32 {
        self.off_hour as u32 * 60 + self.off_minute as u32
    }

    /// Whether the on time falls after the off time in local wall clock
    /// (lights span midnight).
    pub fn is_overnight(&self) -> bool {
        self.on_minute_of_day() >= self.off_minute_of_day()
    }
}

/// Superimposed pump duty cycle, anchored at the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpCycle {
    /// Minutes the pump runs at the start of each period.
    pub on_minutes: u32,
    /// Full cycle period in minutes; clamped up to at least `on_minutes`.
    pub period_minutes: u32,
    /// Duty percent applied while the pump is on.
    pub intensity_percent: u8,
}

impl Default for PumpCycle {
    fn default() -> Self {
        Self {
            on_minutes: 15,
            period_minutes: 60,
            intensity_percent: 70,
        }
    }
}

impl PumpCycle {
    /// Enforce load-time invariants: period >= on-duration, intensity <= 100.
    pub fn normalized(mut self) -> Self {
        if self.period_minutes < self.on_minutes {
            self.period_minutes = self.on_minutes;
        }
        if self.intensity_percent > crate::MAX_PERCENT {
            self.intensity_percent = crate::MAX_PERCENT;
        }
        self
    }
}
