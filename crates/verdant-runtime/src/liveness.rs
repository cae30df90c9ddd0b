//! Task-liveness registry for the safety watchdog.
//!
//! Long-lived tasks register once and touch their token from inside their
//! loop. The watchdog asks for tasks whose last touch is older than its
//! budget. Touching is a single atomic store; nothing on this path
//! allocates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Registry of task heartbeats.
#[derive(Debug)]
pub struct Liveness {
    epoch: Instant,
    slots: Mutex<Vec<Slot>>,
}

#[derive(Debug)]
struct Slot {
    name: &'static str,
    last_ms: Arc<AtomicU64>,
}

/// A registered task's heartbeat handle.
#[derive(Debug, Clone)]
pub struct LivenessToken {
    epoch: Instant,
    last_ms: Arc<AtomicU64>,
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Register a task. The token starts freshly touched.
    pub fn register(&self, name: &'static str) -> LivenessToken {
        let last_ms = Arc::new(AtomicU64::new(self.elapsed_ms()));
        self.slots.lock().unwrap().push(Slot {
            name,
            last_ms: last_ms.clone(),
        });
        LivenessToken {
            epoch: self.epoch,
            last_ms,
        }
    }

    /// Names of tasks whose last touch is older than `max_age`.
    pub fn stale(&self, max_age: Duration) -> Vec<&'static str> {
        let now_ms = self.elapsed_ms();
        let max_ms = max_age.as_millis() as u64;
        self.slots
            .lock()
            .unwrap()
            .iter()
            .filter(|slot| now_ms.saturating_sub(slot.last_ms.load(Ordering::Relaxed)) > max_ms)
            .map(|slot| slot.name)
            .collect()
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

impl LivenessToken {
    /// Record that the owning task is alive.
    pub fn touch(&self) {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        self.last_ms.store(now_ms, Ordering::Relaxed);
    }
}
