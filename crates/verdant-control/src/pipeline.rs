//! The single consumer of the command queue.

use crate::{ramp_steps, CommandQueue, PwmBackend, SharedSnapshot};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use verdant_runtime::{AuditSink, LinkBits, LivenessToken, SHUTDOWN};
use verdant_types::{Command, MAX_PERCENT};

/// Upper bound on waiting out a ramp before the next command is taken.
const MAX_RAMP_WAIT: Duration = Duration::from_secs(10);

/// Consumes commands in priority order and programs the peripheral.
pub struct ControlPipeline {
    queue: Arc<CommandQueue>,
    pwm: Box<dyn PwmBackend>,
    snapshot: SharedSnapshot,
    bits: Arc<LinkBits>,
    audit: AuditSink,
    liveness: LivenessToken,
    step_ms: u32,
}

impl ControlPipeline {
    pub fn new(
        queue: Arc<CommandQueue>,
        pwm: Box<dyn PwmBackend>,
        snapshot: SharedSnapshot,
        bits: Arc<LinkBits>,
        audit: AuditSink,
        liveness: LivenessToken,
        step_ms: u32,
    ) -> Self {
        Self {
            queue,
            pwm,
            snapshot,
            bits,
            audit,
            liveness,
            step_ms,
        }
    }

    /// Run until shutdown. In-flight ramps complete; queued work is
    /// discarded with the queue.
    pub async fn run(mut self) {
        info!("Control pipeline started");
        loop {
            let cmd = tokio::select! {
                _ = self.bits.wait_for(SHUTDOWN) => break,
                cmd = self.queue.recv() => cmd,
            };
            self.apply(cmd).await;
            self.liveness.touch();
        }
        info!("Control pipeline stopped");
    }

    /// Apply one command: clamp, program, then publish the snapshot.
    async fn apply(&mut self, cmd: Command) {
        let light = cmd.light_percent.min(MAX_PERCENT);
        let pump = cmd.pump_percent.min(MAX_PERCENT);
        let steps = ramp_steps(cmd.ramp_ms, self.step_ms);

        match self.pwm.apply(light, pump, cmd.ramp_ms, steps) {
            Ok(()) => {
                // Snapshot changes only after the peripheral accepted the
                // duty.
                {
                    let mut state = self.snapshot.lock().unwrap();
                    state.light_percent = light;
                    state.pump_percent = pump;
                    state.last_seq = cmd.seq;
                    state.applied_at = Some(Instant::now());
                }
                debug!(
                    actor = %cmd.actor,
                    seq = cmd.seq,
                    light,
                    pump,
                    ramp_ms = cmd.ramp_ms,
                    "Applied command"
                );
                if cmd.ramp_ms > 0 {
                    let wait = Duration::from_millis(u64::from(cmd.ramp_ms)).min(MAX_RAMP_WAIT);
                    tokio::time::sleep(wait).await;
                }
            }
            Err(err) => {
                // Snapshot untouched; the next command retries the
                // peripheral.
                warn!(actor = %cmd.actor, seq = cmd.seq, error = %err, "Peripheral rejected command");
                self.audit
                    .emit(format!("control: apply failed ({}, seq {}): {err}", cmd.actor, cmd.seq));
            }
        }
    }
}
