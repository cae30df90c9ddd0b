//! Bounded audit intake.
//!
//! Any task may push short free-text lines; a single consumer (telemetry)
//! drains them. The queue is bounded and never blocks a producer: a full
//! queue surfaces as `Timeout` to the caller, matching the device's
//! no-unbounded-wait rule.

use crate::{RuntimeError, RuntimeResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Longest audit line accepted; longer lines are truncated with a marker.
pub const MAX_AUDIT_LINE: usize = 192;

const TRUNCATION_MARKER: &str = "…";

/// Create a bounded audit channel.
pub fn audit_channel(capacity: usize) -> (AuditSink, AuditQueue) {
    let (tx, rx) = mpsc::channel(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        AuditSink {
            tx,
            dropped: dropped.clone(),
        },
        AuditQueue { rx, dropped },
    )
}

/// Producer half; cheap to clone into every task.
#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<String>,
    dropped: Arc<AtomicU64>,
}

impl AuditSink {
    /// Push a line, failing with `Timeout` when the queue is full.
    pub fn try_emit(&self, line: impl Into<String>) -> RuntimeResult<()> {
        let line = truncate_line(line.into());
        match self.tx.try_send(line) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(RuntimeError::Timeout)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(RuntimeError::Closed),
        }
    }

    /// Push a line, logging instead of failing when it cannot be queued.
    pub fn emit(&self, line: impl Into<String>) {
        let line = line.into();
        if let Err(err) = self.try_emit(line.clone()) {
            warn!(error = %err, line = %line, "Audit line dropped");
        }
    }

    /// Lines dropped so far due to a full queue.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer half, held by the telemetry drain task.
pub struct AuditQueue {
    rx: mpsc::Receiver<String>,
    dropped: Arc<AtomicU64>,
}

impl AuditQueue {
    /// Receive the next line; `None` when every sink is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn truncate_line(line: String) -> String {
    if line.len() <= MAX_AUDIT_LINE {
        return line;
    }
    // Cut on a char boundary, leaving room for the marker.
    let budget = MAX_AUDIT_LINE - TRUNCATION_MARKER.len();
    let mut end = budget;
    while end > 0 && !line.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = line[..end].to_string();
    out.push_str(TRUNCATION_MARKER);
    out
}
