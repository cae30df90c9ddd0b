//! Command records flowing through the control pipeline.

use serde::{Deserialize, Serialize};

/// Upper bound for actuator duty percentages.
pub const MAX_PERCENT: u8 = 100;

/// The logical origin of a command.
///
/// Determines audit attribution and queue priority: `Safety` commands
/// preempt everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Unknown,
    LocalRadio,
    Schedule,
    Safety,
    Cloud,
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Actor::Unknown => "unknown",
            Actor::LocalRadio => "local_radio",
            Actor::Schedule => "schedule",
            Actor::Safety => "safety",
            Actor::Cloud => "cloud",
        };
        f.write_str(name)
    }
}

/// An immutable actuator change request.
///
/// Constructed by a producer, enqueued, destroyed when the control pipeline
/// consumes it. Percent fields are clamped at construction; a ramp of zero
/// is honored as a hard transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub actor: Actor,
    /// Monotonic sequence within the producer (the session counter for
    /// local-radio commands).
    pub seq: u64,
    /// Wall-clock seconds since the Unix epoch at construction.
    pub timestamp: i64,
    pub light_percent: u8,
    pub pump_percent: u8,
    /// Ramp duration in milliseconds; 0 means apply instantly.
    pub ramp_ms: u32,
}

impl Command {
    /// Build a command, clamping percents to `0..=100`.
    pub fn new(
        actor: Actor,
        seq: u64,
        timestamp: i64,
        light_percent: u8,
        pump_percent: u8,
        ramp_ms: u32,
    ) -> Self {
        Self {
            actor,
            seq,
            timestamp,
            light_percent: light_percent.min(MAX_PERCENT),
            pump_percent: pump_percent.min(MAX_PERCENT),
            ramp_ms,
        }
    }

    /// The urgent all-off record used by the safety path.
    pub fn safety_stop(seq: u64, timestamp: i64) -> Self {
        Self {
            actor: Actor::Safety,
            seq,
            timestamp,
            light_percent: 0,
            pump_percent: 0,
            ramp_ms: 0,
        }
    }

    /// Whether this command bypasses normal FIFO ordering.
    pub fn is_urgent(&self) -> bool {
        self.actor == Actor::Safety
    }
}
