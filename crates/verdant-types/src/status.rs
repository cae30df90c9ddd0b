//! Device status enums surfaced through telemetry and the shadow.

use serde::{Deserialize, Serialize};

/// Outcome of the most recent firmware update attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    /// No update has been attempted since boot.
    Idle,
    InProgress,
    Succeeded,
    /// The boot loader fell back to the previous slot.
    Reverted,
    Failed,
}

impl std::fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            UpdateStatus::Idle => "idle",
            UpdateStatus::InProgress => "in_progress",
            UpdateStatus::Succeeded => "succeeded",
            UpdateStatus::Reverted => "reverted",
            UpdateStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why the device last reset, as reported in heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetReason {
    PowerOn,
    Software,
    Watchdog,
    Brownout,
    Unknown,
}

impl Default for ResetReason {
    fn default() -> Self {
        ResetReason::Unknown
    }
}
