//! Audit-queue drain.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use verdant_cloud::CloudLink;
use verdant_runtime::{AuditQueue, LinkBits, LivenessToken, CLOUD_SESSION_UP, SHUTDOWN};

/// Single consumer of the audit queue; publishes lines to the audit topic
/// while the cloud session is up and drops them otherwise.
pub struct AuditDrain {
    queue: AuditQueue,
    link: Arc<dyn CloudLink>,
    topic: String,
    bits: Arc<LinkBits>,
    liveness: LivenessToken,
}

impl AuditDrain {
    pub fn new(
        queue: AuditQueue,
        link: Arc<dyn CloudLink>,
        topic: String,
        bits: Arc<LinkBits>,
        liveness: LivenessToken,
    ) -> Self {
        Self {
            queue,
            link,
            topic,
            bits,
            liveness,
        }
    }

    /// Publish one line, or drop it while offline.
    pub fn handle_line(&self, line: &str) -> bool {
        if !self.bits.contains(CLOUD_SESSION_UP) {
            debug!(line, "Cloud session down, dropping audit line");
            return false;
        }
        match self.link.publish(&self.topic, line.as_bytes()) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "Audit publish failed");
                false
            }
        }
    }

    /// Run until shutdown or until every producer is gone.
    pub async fn run(mut self) {
        info!("Audit drain started");
        loop {
            tokio::select! {
                _ = self.bits.wait_for(SHUTDOWN) => break,
                maybe_line = self.queue.recv() => {
                    match maybe_line {
                        Some(line) => { self.handle_line(&line); }
                        None => break,
                    }
                }
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
            self.liveness.touch();
        }
        info!("Audit drain stopped");
    }
}
