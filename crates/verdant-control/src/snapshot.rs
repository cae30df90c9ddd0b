//! Last-applied actuator state.

use std::sync::{Arc, Mutex};
use std::time::Instant;

/// The last duty pair the peripheral accepted.
///
/// Exactly one writer (the control pipeline); everyone else reads through
/// the mutex.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActuatorSnapshot {
    pub light_percent: u8,
    pub pump_percent: u8,
    /// Sequence of the command that produced this state.
    pub last_seq: u64,
    /// When the peripheral accepted it; `None` until the first command.
    pub applied_at: Option<Instant>,
}

/// Shared handle to the snapshot singleton.
pub type SharedSnapshot = Arc<Mutex<ActuatorSnapshot>>;

impl ActuatorSnapshot {
    /// Create a fresh all-off snapshot handle.
    pub fn new_shared() -> SharedSnapshot {
        Arc::new(Mutex::new(ActuatorSnapshot::default()))
    }

    /// Read the current state out of a shared handle.
    pub fn read(snapshot: &SharedSnapshot) -> ActuatorSnapshot {
        *snapshot.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_all_off() {
        let snapshot = ActuatorSnapshot::new_shared();
        let state = ActuatorSnapshot::read(&snapshot);
        assert_eq!(state.light_percent, 0);
        assert_eq!(state.pump_percent, 0);
        assert!(state.applied_at.is_none());
    }

    #[test]
    fn updates_are_visible_to_readers() {
        let snapshot = ActuatorSnapshot::new_shared();
        {
            let mut state = snapshot.lock().unwrap();
            state.light_percent = 75;
            state.pump_percent = 30;
            state.last_seq = 4;
            state.applied_at = Some(Instant::now());
        }
        let state = ActuatorSnapshot::read(&snapshot);
        assert_eq!(state.light_percent, 75);
        assert_eq!(state.pump_percent, 30);
        assert_eq!(state.last_seq, 4);
        assert!(state.applied_at.is_some());
    }
}
