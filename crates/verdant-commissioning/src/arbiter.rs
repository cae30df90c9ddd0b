//! Timing-window state machine for local-channel activation.
//!
//! Owns the `LOCAL_CHANNEL_ACTIVE` bit and nothing else; the session
//! server observes the bit and starts or stops advertising accordingly.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::info;
use verdant_runtime::{LinkBits, LivenessToken, LOCAL_CHANNEL_ACTIVE, SHUTDOWN, TIME_SYNCED, WIFI_UP};

/// Timing budgets for the arbitration window.
#[derive(Debug, Clone, Copy)]
pub struct ArbiterConfig {
    /// How long after boot the channel opens when the link never came up.
    pub ble_fallback: Duration,
    /// Continuous link uptime that closes the channel.
    pub wifi_stable: Duration,
    /// Delay after a provisioning attempt before re-opening on a still
    /// missing link.
    pub reopen_after: Duration,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            ble_fallback: Duration::from_secs(30),
            wifi_stable: Duration::from_secs(5 * 60),
            reopen_after: Duration::from_secs(180),
        }
    }
}

/// Shared handle the session server uses to report provisioning events.
#[derive(Clone, Default)]
pub struct ArbiterHandle {
    provisioned_at: Arc<Mutex<Option<Instant>>>,
}

impl ArbiterHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a provisioning frame was just accepted.
    pub fn note_provisioned(&self) {
        *self.provisioned_at.lock().unwrap() = Some(Instant::now());
    }

    fn provisioned_at(&self) -> Option<Instant> {
        *self.provisioned_at.lock().unwrap()
    }
}

/// The arbitration state machine.
pub struct CommissioningArbiter {
    cfg: ArbiterConfig,
    bits: Arc<LinkBits>,
    stability: watch::Receiver<Option<Instant>>,
    handle: ArbiterHandle,
    liveness: LivenessToken,
    boot: Instant,
    ever_opened: bool,
    /// Provisioning instant already acknowledged with a close.
    provision_closed: Option<Instant>,
}

impl CommissioningArbiter {
    pub fn new(
        cfg: ArbiterConfig,
        bits: Arc<LinkBits>,
        stability: watch::Receiver<Option<Instant>>,
        handle: ArbiterHandle,
        liveness: LivenessToken,
        boot: Instant,
    ) -> Self {
        Self {
            cfg,
            bits,
            stability,
            handle,
            liveness,
            boot,
            ever_opened: false,
            provision_closed: None,
        }
    }

    /// Evaluate every guard against `now`. Pure with respect to time so
    /// the timing table is testable without sleeping.
    pub fn step(&mut self, now: Instant) {
        let wifi_up = self.bits.contains(WIFI_UP);
        let time_synced = self.bits.contains(TIME_SYNCED);
        let active = self.bits.contains(LOCAL_CHANNEL_ACTIVE);
        let provisioned_at = self.handle.provisioned_at();

        // A fresh provisioning attempt closes the window once.
        if let Some(at) = provisioned_at {
            if self.provision_closed != Some(at) {
                self.provision_closed = Some(at);
                if active {
                    info!("Provisioning received, closing local channel");
                    self.bits.clear(LOCAL_CHANNEL_ACTIVE);
                }
                return;
            }
        }

        // Boot fallback: the bit opens once when the link never became
        // usable within the budget.
        if !self.ever_opened
            && now.duration_since(self.boot) >= self.cfg.ble_fallback
            && (!wifi_up || !time_synced)
        {
            info!("Link not usable after boot budget, opening local channel");
            self.bits.set(LOCAL_CHANNEL_ACTIVE);
            self.ever_opened = true;
            return;
        }

        // A continuously stable link closes the window.
        if active && wifi_up {
            if let Some(up_since) = *self.stability.borrow() {
                if now.duration_since(up_since) >= self.cfg.wifi_stable {
                    info!("Link stable, closing local channel");
                    self.bits.clear(LOCAL_CHANNEL_ACTIVE);
                    return;
                }
            }
        }

        // Provisioning that did not lead to a link re-opens the window.
        if let Some(at) = provisioned_at {
            if !active && !wifi_up && now.duration_since(at) >= self.cfg.reopen_after {
                info!("Provisioning did not produce a link, re-opening local channel");
                self.bits.set(LOCAL_CHANNEL_ACTIVE);
                self.ever_opened = true;
            }
        }
    }

    /// Run the 1 s tick loop until shutdown.
    pub async fn run(mut self) {
        info!("Commissioning arbiter started");
        loop {
            tokio::select! {
                _ = self.bits.wait_for(SHUTDOWN) => break,
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
            self.step(Instant::now());
            self.liveness.touch();
        }
        info!("Commissioning arbiter stopped");
    }
}
