//! Sliding anti-replay window.
//!
//! A 64-bit bitmap anchored at the highest accepted counter: bit *i* set
//! means counter `C − i` was accepted. The window is persisted on every
//! acceptance, before the resulting command is enqueued, so a counter is
//! never reusable across a reboot.

use crate::CommResult;
use verdant_store::{Store, StoreError, StoreKeys};

/// Width of the acceptance window.
const WINDOW_BITS: u32 = 64;

/// Highest accepted counter plus the acceptance bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayWindow {
    pub counter: u32,
    pub window: u64,
}

impl ReplayWindow {
    /// The post-handshake state: nothing accepted yet.
    pub fn fresh() -> Self {
        Self::default()
    }

    /// Apply the replay rules to an incoming counter. Returns whether it
    /// is acceptable, mutating the window on acceptance.
    pub fn check(&mut self, incoming: u32) -> bool {
        if incoming > self.counter {
            let delta = incoming - self.counter;
            self.window = if delta >= WINDOW_BITS {
                1
            } else {
                (self.window << delta) | 1
            };
            self.counter = incoming;
            true
        } else {
            let back = self.counter - incoming;
            if back >= WINDOW_BITS {
                return false;
            }
            let mask = 1u64 << back;
            if self.window & mask != 0 {
                return false;
            }
            self.window |= mask;
            true
        }
    }

    /// Load the persisted window; absent keys mean a fresh window.
    pub fn load(store: &Store) -> CommResult<Self> {
        let counter = match store.load_u32(StoreKeys::BLE_PEER_COUNTER) {
            Ok(counter) => counter,
            Err(StoreError::NotFound) => return Ok(Self::fresh()),
            Err(err) => return Err(err.into()),
        };
        let window = match store.load_u64(StoreKeys::BLE_PEER_WINDOW) {
            Ok(window) => window,
            Err(StoreError::NotFound) => 0,
            Err(err) => return Err(err.into()),
        };
        Ok(Self { counter, window })
    }

    /// Persist both halves of the window.
    pub fn persist(&self, store: &Store) -> CommResult<()> {
        store.save_u32(StoreKeys::BLE_PEER_COUNTER, self.counter)?;
        store.save_u64(StoreKeys::BLE_PEER_WINDOW, self.window)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use verdant_store::MemoryKv;

    fn window(counter: u32, bitmap: u64) -> ReplayWindow {
        ReplayWindow {
            counter,
            window: bitmap,
        }
    }

    #[test]
    fn first_counter_accepted() {
        let mut w = window(0, 0);
        assert!(w.check(1));
        assert_eq!(w, window(1, 1));
    }

    #[test]
    fn exact_replay_rejected() {
        let mut w = window(1, 1);
        assert!(!w.check(1));
        assert_eq!(w, window(1, 1));
    }

    #[test]
    fn late_counter_within_window_accepted_once() {
        let mut w = window(5, 1);
        assert!(w.check(3));
        assert_eq!(w, window(5, 0b101));
        // And only once.
        assert!(!w.check(3));
        assert_eq!(w, window(5, 0b101));
    }

    #[test]
    fn late_counter_at_window_edge() {
        let mut w = window(5, 1);
        assert!(w.check(1));
        assert_eq!(w, window(5, 0b10001));
    }

    #[test]
    fn far_past_counter_rejected() {
        let mut w = window(100, 0);
        assert!(!w.check(30));
        assert_eq!(w, window(100, 0));
    }

    #[test]
    fn far_future_counter_resets_window() {
        let mut w = window(5, 1);
        assert!(w.check(80));
        assert_eq!(w, window(80, 1));
    }

    #[test]
    fn window_shifts_on_small_advance() {
        let mut w = window(5, 0b1);
        assert!(w.check(7));
        // Old bit 0 (counter 5) slides to bit 2.
        assert_eq!(w, window(7, 0b101));
        assert!(!w.check(5));
        assert!(!w.check(7));
        assert!(w.check(6));
        assert_eq!(w, window(7, 0b111));
    }

    #[test]
    fn back_exactly_64_is_out_of_window() {
        let mut w = window(64, 1);
        assert!(!w.check(0));
    }

    #[test]
    fn back_63_is_inside_window() {
        let mut w = window(64, 1);
        assert!(w.check(1));
        assert_eq!(w.window, 1 | (1 << 63));
    }

    #[test]
    fn zero_counter_accepted_once_after_fresh() {
        // Fresh state has bit 0 clear, so counter 0 itself is usable
        // exactly once.
        let mut w = ReplayWindow::fresh();
        assert!(w.check(0));
        assert_eq!(w, window(0, 1));
        assert!(!w.check(0));
    }

    #[test]
    fn persist_and_load_roundtrip() {
        let store = Store::new(Arc::new(MemoryKv::new()));
        let mut w = ReplayWindow::fresh();
        assert!(w.check(5));
        assert!(w.check(3));
        w.persist(&store).unwrap();

        let loaded = ReplayWindow::load(&store).unwrap();
        assert_eq!(loaded, w);
    }

    #[test]
    fn load_without_state_is_fresh() {
        let store = Store::new(Arc::new(MemoryKv::new()));
        assert_eq!(ReplayWindow::load(&store).unwrap(), ReplayWindow::fresh());
    }

    #[test]
    fn replay_survives_persist_reload() {
        let store = Store::new(Arc::new(MemoryKv::new()));
        let mut w = ReplayWindow::fresh();
        assert!(w.check(5));
        w.persist(&store).unwrap();

        // Simulated reboot.
        let mut reloaded = ReplayWindow::load(&store).unwrap();
        assert!(!reloaded.check(5));
    }
}
