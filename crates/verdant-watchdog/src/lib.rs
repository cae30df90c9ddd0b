//! Safety watchdog for the Verdant controller.
//!
//! The highest-priority loop in the device: pets the hardware task
//! watchdog on a fixed cadence and, on any liveness anomaly, forces both
//! actuators to zero through the control pipeline's preempt path before
//! the expected reset.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{error, info};
use verdant_control::{safety_shutdown, CommandQueue};
use verdant_runtime::{AuditSink, LinkBits, Liveness, SHUTDOWN};

/// Errors from the watchdog backend.
#[derive(Error, Debug)]
pub enum WatchdogError {
    #[error("Watchdog backend error: {0}")]
    Backend(String),
}

/// Result type for watchdog operations.
pub type WatchdogResult<T> = Result<T, WatchdogError>;

/// The hardware task-watchdog peripheral.
pub trait WatchdogBackend: Send {
    fn pet(&mut self) -> WatchdogResult<()>;
}

/// Counting backend for tests.
#[derive(Default, Clone)]
pub struct MemoryWatchdog {
    inner: Arc<std::sync::Mutex<MemoryWatchdogState>>,
}

#[derive(Default)]
struct MemoryWatchdogState {
    pets: u64,
    fail: bool,
}

impl MemoryWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pets(&self) -> u64 {
        self.inner.lock().unwrap().pets
    }

    pub fn fail(&self, fail: bool) {
        self.inner.lock().unwrap().fail = fail;
    }
}

impl WatchdogBackend for MemoryWatchdog {
    fn pet(&mut self) -> WatchdogResult<()> {
        let mut state = self.inner.lock().unwrap();
        if state.fail {
            return Err(WatchdogError::Backend("injected pet failure".into()));
        }
        state.pets += 1;
        Ok(())
    }
}

/// The pet loop plus the forced-shutdown entrypoint.
pub struct SafetyWatchdog {
    backend: Box<dyn WatchdogBackend>,
    liveness: Arc<Liveness>,
    queue: Arc<CommandQueue>,
    bits: Arc<LinkBits>,
    audit: AuditSink,
    pet_interval: Duration,
    stale_after: Duration,
    tripped: bool,
}

impl SafetyWatchdog {
    pub fn new(
        backend: Box<dyn WatchdogBackend>,
        liveness: Arc<Liveness>,
        queue: Arc<CommandQueue>,
        bits: Arc<LinkBits>,
        audit: AuditSink,
        pet_interval: Duration,
        stale_after: Duration,
    ) -> Self {
        Self {
            backend,
            liveness,
            queue,
            bits,
            audit,
            pet_interval,
            stale_after,
            tripped: false,
        }
    }

    /// One supervision pass. Returns whether an anomaly tripped the
    /// forced shutdown.
    pub fn check(&mut self) -> bool {
        let stale = self.liveness.stale(self.stale_after);
        if !stale.is_empty() {
            if !self.tripped {
                self.tripped = true;
                error!(?stale, "Task liveness anomaly, forcing actuators off");
                self.trip(&format!("stale tasks {stale:?}"));
            }
            return true;
        }
        self.tripped = false;

        if let Err(err) = self.backend.pet() {
            error!(error = %err, "Watchdog pet failed, forcing actuators off");
            self.trip(&format!("pet failed: {err}"));
            return true;
        }
        false
    }

    fn trip(&self, reason: &str) {
        safety_shutdown(&self.queue, unix_now());
        self.audit.emit(format!("watchdog: forced shutdown: {reason}"));
    }

    /// Run until shutdown. The hardware watchdog resets the device if this
    /// loop itself ever stalls.
    pub async fn run(mut self) {
        info!("Safety watchdog started");
        loop {
            tokio::select! {
                _ = self.bits.wait_for(SHUTDOWN) => break,
                _ = tokio::time::sleep(self.pet_interval) => {}
            }
            self.check();
        }
        info!("Safety watchdog stopped");
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
