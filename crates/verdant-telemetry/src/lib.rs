//! Telemetry for the Verdant controller.
//!
//! Two flows, both gated on the cloud session: a periodic heartbeat with
//! device vitals, and the drain side of the bounded audit queue.

mod audit;
mod heartbeat;

pub use audit::AuditDrain;
pub use heartbeat::{HeartbeatTask, StaticProbe, SystemProbe};
