//! Inbound cloud-message routing.

use crate::{matches_jobs_notify, route_job, CloudEvent, CloudError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use verdant_crypto::TrustRoot;
use verdant_runtime::{AuditSink, LinkBits, LivenessToken, CLOUD_SESSION_UP, SHUTDOWN};
use verdant_types::Manifest;

/// Owns the `CLOUD_SESSION_UP` bit and fans inbound messages out to their
/// consumers (currently: manifests to the update pipeline).
pub struct CloudRouter {
    device_id: String,
    events: mpsc::Receiver<CloudEvent>,
    manifests: mpsc::Sender<Manifest>,
    trust_root: TrustRoot,
    legacy_compat: bool,
    bits: Arc<LinkBits>,
    audit: AuditSink,
    liveness: LivenessToken,
}

impl CloudRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device_id: String,
        events: mpsc::Receiver<CloudEvent>,
        manifests: mpsc::Sender<Manifest>,
        trust_root: TrustRoot,
        legacy_compat: bool,
        bits: Arc<LinkBits>,
        audit: AuditSink,
        liveness: LivenessToken,
    ) -> Self {
        Self {
            device_id,
            events,
            manifests,
            trust_root,
            legacy_compat,
            bits,
            audit,
            liveness,
        }
    }

    /// Handle one event from the MQTT client.
    pub fn handle_event(&mut self, event: CloudEvent) {
        match event {
            CloudEvent::SessionUp => {
                info!("Cloud session up");
                self.bits.set(CLOUD_SESSION_UP);
            }
            CloudEvent::SessionDown => {
                info!("Cloud session down");
                self.bits.clear(CLOUD_SESSION_UP);
            }
            CloudEvent::Message(message) => {
                if matches_jobs_notify(&message.topic, &self.device_id) {
                    self.handle_job(&message.payload);
                } else {
                    debug!(topic = %message.topic, "Ignoring unrouted cloud message");
                }
            }
        }
    }

    fn handle_job(&mut self, payload: &[u8]) {
        match route_job(payload, self.legacy_compat, &self.trust_root) {
            Ok(Some(manifest)) => {
                info!(version = manifest.version, "Job carried an update manifest");
                if self.manifests.try_send(manifest).is_err() {
                    warn!("Update pipeline busy, dropping job manifest");
                    self.audit.emit("cloud: manifest dropped, pipeline busy");
                }
            }
            Ok(None) => debug!("Job carried nothing actionable"),
            Err(err @ CloudError::LegacyDisabled) | Err(err @ CloudError::Unauthorized) => {
                warn!(error = %err, "Job rejected");
                self.audit.emit(format!("cloud: job rejected: {err}"));
            }
            Err(err) => {
                warn!(error = %err, "Job unparsable");
                self.audit.emit(format!("cloud: job unparsable: {err}"));
            }
        }
    }

    /// Run until shutdown or until the MQTT client goes away.
    pub async fn run(mut self) {
        info!("Cloud router started");
        loop {
            tokio::select! {
                _ = self.bits.wait_for(SHUTDOWN) => break,
                maybe_event = self.events.recv() => {
                    match maybe_event {
                        Some(event) => self.handle_event(event),
                        None => break,
                    }
                }
            }
            self.liveness.touch();
        }
        self.bits.clear(CLOUD_SESSION_UP);
        info!("Cloud router stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CloudMessage;
    use verdant_runtime::{audit_channel, Liveness};

    struct Fixture {
        router: CloudRouter,
        manifests: mpsc::Receiver<Manifest>,
        bits: Arc<LinkBits>,
        _events_tx: mpsc::Sender<CloudEvent>,
    }

    fn fixture() -> Fixture {
        let bits = Arc::new(LinkBits::new());
        let (events_tx, events_rx) = mpsc::channel(8);
        let (manifest_tx, manifests) = mpsc::channel(2);
        let (audit, _rx) = audit_channel(16);
        let router = CloudRouter::new(
            "grow-1".into(),
            events_rx,
            manifest_tx,
            TrustRoot::default(),
            false,
            bits.clone(),
            audit,
            Liveness::new().register("cloud"),
        );
        Fixture {
            router,
            manifests,
            bits,
            _events_tx: events_tx,
        }
    }

    fn job_message(body: serde_json::Value) -> CloudEvent {
        CloudEvent::Message(CloudMessage {
            topic: "$aws/things/grow-1/jobs/job-7/notify-next".into(),
            payload: body.to_string().into_bytes(),
        })
    }

    #[tokio::test]
    async fn session_events_own_the_bit() {
        let mut f = fixture();
        f.router.handle_event(CloudEvent::SessionUp);
        assert!(f.bits.contains(CLOUD_SESSION_UP));
        f.router.handle_event(CloudEvent::SessionDown);
        assert!(!f.bits.contains(CLOUD_SESSION_UP));
    }

    #[tokio::test]
    async fn manifest_job_is_forwarded() {
        let mut f = fixture();
        f.router.handle_event(job_message(serde_json::json!({
            "manifest": {
                "url": "https://fw.verdant.garden/app.bin",
                "digest": "ab".repeat(32),
                "signature": "QUJD",
                "version": 6
            }
        })));
        let manifest = f.manifests.try_recv().unwrap();
        assert_eq!(manifest.version, 6);
    }

    #[tokio::test]
    async fn foreign_topic_is_ignored() {
        let mut f = fixture();
        f.router.handle_event(CloudEvent::Message(CloudMessage {
            topic: "$aws/things/other/jobs/job-7/notify-next".into(),
            payload: b"{}".to_vec(),
        }));
        assert!(f.manifests.try_recv().is_err());
    }

    #[tokio::test]
    async fn legacy_job_is_dropped_by_default() {
        let mut f = fixture();
        f.router.handle_event(job_message(serde_json::json!({
            "jobId": "job-7",
            "ota_url": "https://fw.verdant.garden/app.bin",
            "signature": "QUJD"
        })));
        assert!(f.manifests.try_recv().is_err());
    }
}
