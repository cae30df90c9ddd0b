//! Periodic device heartbeat.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use verdant_cloud::CloudLink;
use verdant_control::{ActuatorSnapshot, SharedSnapshot};
use verdant_runtime::{LinkBits, LivenessToken, CLOUD_SESSION_UP, SHUTDOWN};
use verdant_store::{Store, StoreKeys};
use verdant_types::{ResetReason, ScheduleConfig};

/// Platform vitals the heartbeat samples.
pub trait SystemProbe: Send {
    /// Minimum-ever free heap, when the platform tracks it.
    fn min_free_bytes(&self) -> Option<u64>;
    fn reset_reason(&self) -> ResetReason;
}

/// Fixed-answer probe for tests and hosted builds.
pub struct StaticProbe {
    pub min_free: Option<u64>,
    pub reason: ResetReason,
}

impl SystemProbe for StaticProbe {
    fn min_free_bytes(&self) -> Option<u64> {
        self.min_free
    }

    fn reset_reason(&self) -> ResetReason {
        self.reason
    }
}

/// Publishes a vitals document every `interval`, silently skipping beats
/// while the cloud session is down.
pub struct HeartbeatTask {
    link: Arc<dyn CloudLink>,
    topic: String,
    interval: Duration,
    store: Store,
    snapshot: SharedSnapshot,
    probe: Box<dyn SystemProbe>,
    rssi: watch::Receiver<Option<i8>>,
    bits: Arc<LinkBits>,
    liveness: LivenessToken,
    boot: Instant,
}

impl HeartbeatTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        link: Arc<dyn CloudLink>,
        topic: String,
        interval: Duration,
        store: Store,
        snapshot: SharedSnapshot,
        probe: Box<dyn SystemProbe>,
        rssi: watch::Receiver<Option<i8>>,
        bits: Arc<LinkBits>,
        liveness: LivenessToken,
    ) -> Self {
        Self {
            link,
            topic,
            interval,
            store,
            snapshot,
            probe,
            rssi,
            bits,
            liveness,
            boot: Instant::now(),
        }
    }

    /// Assemble one heartbeat document.
    pub fn build_payload(&self, now: DateTime<Utc>) -> serde_json::Value {
        let state = ActuatorSnapshot::read(&self.snapshot);
        let (next_on, next_off) = self.next_transitions(now);
        json!({
            "ts": now.timestamp(),
            "uptime_secs": self.boot.elapsed().as_secs(),
            "reset_reason": self.probe.reset_reason(),
            "min_free_bytes": self.probe.min_free_bytes(),
            "rssi": *self.rssi.borrow(),
            "light_percent": state.light_percent,
            "pump_percent": state.pump_percent,
            "next_on": next_on.map(|t| t.timestamp()),
            "next_off": next_off.map(|t| t.timestamp()),
        })
    }

    fn next_transitions(
        &self,
        now: DateTime<Utc>,
    ) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let cfg = match self.store.load(StoreKeys::SCHEDULE_CFG) {
            Ok(bytes) => match serde_json::from_slice::<ScheduleConfig>(&bytes) {
                Ok(cfg) => cfg,
                Err(_) => return (None, None),
            },
            Err(_) => return (None, None),
        };
        (
            verdant_schedule::next_on(now, &cfg).ok(),
            verdant_schedule::next_off(now, &cfg).ok(),
        )
    }

    /// One beat: drop silently when the session is down, publish otherwise.
    pub fn beat(&self, now: DateTime<Utc>) -> bool {
        if !self.bits.contains(CLOUD_SESSION_UP) {
            debug!("Cloud session down, skipping heartbeat");
            return false;
        }
        let payload = self.build_payload(now);
        match self.link.publish(&self.topic, payload.to_string().as_bytes()) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "Heartbeat publish failed");
                false
            }
        }
    }

    /// Run until shutdown.
    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "Heartbeat started");
        loop {
            let mut remaining = self.interval;
            while remaining > Duration::ZERO {
                if self.bits.is_shutdown() {
                    info!("Heartbeat stopped");
                    return;
                }
                let chunk = remaining.min(Duration::from_secs(1));
                tokio::select! {
                    _ = self.bits.wait_for(SHUTDOWN) => {
                        info!("Heartbeat stopped");
                        return;
                    }
                    _ = tokio::time::sleep(chunk) => {}
                }
                self.liveness.touch();
                remaining = remaining.saturating_sub(chunk);
            }
            self.beat(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdant_cloud::MemoryCloud;
    use verdant_runtime::Liveness;
    use verdant_store::MemoryKv;

    fn utc(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    struct Fixture {
        task: HeartbeatTask,
        cloud: MemoryCloud,
        bits: Arc<LinkBits>,
        store: Store,
        rssi_tx: watch::Sender<Option<i8>>,
    }

    fn fixture() -> Fixture {
        let cloud = MemoryCloud::new();
        let bits = Arc::new(LinkBits::new());
        let store = Store::new(Arc::new(MemoryKv::new()));
        let snapshot = ActuatorSnapshot::new_shared();
        let (rssi_tx, rssi_rx) = watch::channel(Some(-60));
        let task = HeartbeatTask::new(
            Arc::new(cloud.clone()),
            "verdant/grow-1/heartbeat".into(),
            Duration::from_secs(60),
            store.clone(),
            snapshot,
            Box::new(StaticProbe {
                min_free: Some(48_000),
                reason: ResetReason::PowerOn,
            }),
            rssi_rx,
            bits.clone(),
            Liveness::new().register("heartbeat"),
        );
        Fixture {
            task,
            cloud,
            bits,
            store,
            rssi_tx,
        }
    }

    #[tokio::test]
    async fn beat_skipped_while_session_down() {
        let f = fixture();
        assert!(!f.task.beat(utc(0)));
        assert!(f.cloud.published().is_empty());
    }

    #[tokio::test]
    async fn beat_publishes_when_session_up() {
        let f = fixture();
        f.bits.set(CLOUD_SESSION_UP);
        assert!(f.task.beat(utc(1_700_000_000)));
        let beats = f.cloud.published_on("verdant/grow-1/heartbeat");
        assert_eq!(beats.len(), 1);
        let doc: serde_json::Value = serde_json::from_slice(&beats[0]).unwrap();
        assert_eq!(doc["ts"], 1_700_000_000i64);
        assert_eq!(doc["reset_reason"], "power_on");
        assert_eq!(doc["min_free_bytes"], 48_000);
        assert_eq!(doc["rssi"], -60);
    }

    #[tokio::test]
    async fn payload_carries_next_transitions_when_schedule_present() {
        let f = fixture();
        f.store
            .save(
                StoreKeys::SCHEDULE_CFG,
                &serde_json::to_vec(&ScheduleConfig::default()).unwrap(),
            )
            .unwrap();
        let doc = f.task.build_payload(utc(0));
        assert_eq!(doc["next_on"], 7 * 3600);
        assert_eq!(doc["next_off"], 21 * 3600);
    }

    #[tokio::test]
    async fn payload_next_transitions_null_without_schedule() {
        let f = fixture();
        let doc = f.task.build_payload(utc(0));
        assert!(doc["next_on"].is_null());
        assert!(doc["next_off"].is_null());
    }

    #[tokio::test]
    async fn rssi_updates_flow_through() {
        let f = fixture();
        f.rssi_tx.send(Some(-42)).unwrap();
        let doc = f.task.build_payload(utc(0));
        assert_eq!(doc["rssi"], -42);
    }
}
