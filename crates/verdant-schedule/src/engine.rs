//! The minute-tick schedule task.

use crate::eval::{is_light_on, pump_is_on, reconcile};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use verdant_control::CommandQueue;
use verdant_runtime::{AuditSink, LinkBits, LivenessToken, SHUTDOWN, TIME_SYNCED};
use verdant_store::{Store, StoreError, StoreKeys};
use verdant_types::{Actor, Command, PumpCycle, ScheduleConfig, MAX_PERCENT};

/// Longest uninterrupted sleep; keeps the watchdog fed between ticks.
pub const TICK_CHUNK: Duration = Duration::from_millis(900);

/// Evaluates the schedule once per minute and submits a command when the
/// desired actuator pair changes.
pub struct ScheduleEngine {
    store: Store,
    queue: Arc<CommandQueue>,
    bits: Arc<LinkBits>,
    audit: AuditSink,
    liveness: LivenessToken,
    seq: u64,
    last_emitted: Option<(u8, u8)>,
}

impl ScheduleEngine {
    pub fn new(
        store: Store,
        queue: Arc<CommandQueue>,
        bits: Arc<LinkBits>,
        audit: AuditSink,
        liveness: LivenessToken,
    ) -> Self {
        Self {
            store,
            queue,
            bits,
            audit,
            liveness,
            seq: 0,
            last_emitted: None,
        }
    }

    /// Run until shutdown. Holds off the first evaluation until wall-clock
    /// time is trustworthy.
    pub async fn run(mut self) {
        info!("Schedule engine started");
        tokio::select! {
            _ = self.bits.wait_for(SHUTDOWN) => {
                info!("Schedule engine stopped before time sync");
                return;
            }
            _ = self.bits.wait_for(TIME_SYNCED) => {}
        }

        self.reconcile_on_boot(Utc::now());

        while !self.bits.is_shutdown() {
            self.evaluate_tick(Utc::now());
            self.sleep_to_next_minute().await;
        }
        info!("Schedule engine stopped");
    }

    /// Compare the predicate at the persisted checkpoint and now; emit at
    /// most one correction for everything missed while powered off.
    pub fn reconcile_on_boot(&mut self, now: DateTime<Utc>) -> Option<Command> {
        let last_seen_secs = match self.store.load_u64(StoreKeys::LAST_SEEN_UTC) {
            Ok(secs) => secs,
            Err(StoreError::NotFound) => return None,
            Err(err) => {
                warn!(error = %err, "Reconciliation checkpoint unreadable");
                return None;
            }
        };
        let last_seen = DateTime::from_timestamp(last_seen_secs as i64, 0)?;
        let cfg = self.load_schedule();
        match reconcile(last_seen, now, &cfg) {
            Ok(Some(light_on)) => {
                let pump = self.load_pump();
                let cmd = self.emit(now, light_on, pump_is_on(now, &pump), &pump);
                self.audit.emit(format!(
                    "schedule: reboot correction, light {}",
                    if light_on { "on" } else { "off" }
                ));
                Some(cmd)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "Reconciliation failed");
                None
            }
        }
    }

    /// One evaluation pass. Reloads both configuration blobs, persists the
    /// checkpoint, and emits a command only on change.
    pub fn evaluate_tick(&mut self, now: DateTime<Utc>) -> Option<Command> {
        let cfg = self.load_schedule();
        let pump = self.load_pump();

        let light_on = match is_light_on(now, &cfg) {
            Ok(on) => on,
            Err(err) => {
                warn!(error = %err, tz = %cfg.tz, "Schedule evaluation failed");
                return None;
            }
        };
        let pump_on = pump_is_on(now, &pump);

        if let Err(err) = self
            .store
            .save_u64(StoreKeys::LAST_SEEN_UTC, now.timestamp().max(0) as u64)
        {
            warn!(error = %err, "Failed to persist reconciliation checkpoint");
        }

        let desired = (
            if light_on { MAX_PERCENT } else { 0 },
            if pump_on { pump.intensity_percent } else { 0 },
        );
        if self.last_emitted == Some(desired) {
            return None;
        }
        Some(self.emit(now, light_on, pump_on, &pump))
    }

    fn emit(
        &mut self,
        now: DateTime<Utc>,
        light_on: bool,
        pump_on: bool,
        pump: &PumpCycle,
    ) -> Command {
        self.seq += 1;
        let cmd = Command::new(
            Actor::Schedule,
            self.seq,
            now.timestamp(),
            if light_on { MAX_PERCENT } else { 0 },
            if pump_on { pump.intensity_percent } else { 0 },
            0,
        );
        self.last_emitted = Some((cmd.light_percent, cmd.pump_percent));
        debug!(
            light = cmd.light_percent,
            pump = cmd.pump_percent,
            "Schedule transition"
        );
        self.queue.submit(cmd);
        cmd
    }

    fn load_schedule(&self) -> ScheduleConfig {
        match self.store.load(StoreKeys::SCHEDULE_CFG) {
            Ok(bytes) => match serde_json::from_slice::<ScheduleConfig>(&bytes) {
                Ok(cfg) if cfg.validate().is_ok() => return cfg,
                Ok(cfg) => warn!(?cfg, "Stored schedule out of range, using defaults"),
                Err(err) => warn!(error = %err, "Stored schedule unparsable, using defaults"),
            },
            Err(StoreError::NotFound) => {}
            Err(err) => {
                warn!(error = %err, "Schedule blob unreadable, using defaults");
                self.audit.emit(format!("schedule: config unreadable: {err}"));
            }
        }
        // First boot (or damage): materialize defaults and write them back.
        let cfg = ScheduleConfig::default();
        if let Ok(bytes) = serde_json::to_vec(&cfg) {
            if let Err(err) = self.store.save(StoreKeys::SCHEDULE_CFG, &bytes) {
                warn!(error = %err, "Failed to materialize default schedule");
            }
        }
        cfg
    }

    fn load_pump(&self) -> PumpCycle {
        match self.store.load(StoreKeys::PUMP_CFG) {
            Ok(bytes) => match serde_json::from_slice::<PumpCycle>(&bytes) {
                Ok(cycle) => return cycle.normalized(),
                Err(err) => warn!(error = %err, "Stored pump cycle unparsable, using defaults"),
            },
            Err(StoreError::NotFound) => {}
            Err(err) => warn!(error = %err, "Pump blob unreadable, using defaults"),
        }
        let cycle = PumpCycle::default();
        if let Ok(bytes) = serde_json::to_vec(&cycle) {
            let _ = self.store.save(StoreKeys::PUMP_CFG, &bytes);
        }
        cycle
    }

    async fn sleep_to_next_minute(&self) {
        let into_minute = Utc::now().timestamp().rem_euclid(60) as u64;
        let mut remaining = Duration::from_secs(60 - into_minute.min(59));
        while remaining > Duration::ZERO && !self.bits.is_shutdown() {
            let chunk = remaining.min(TICK_CHUNK);
            tokio::time::sleep(chunk).await;
            self.liveness.touch();
            remaining = remaining.saturating_sub(chunk);
        }
    }
}
