//! Staged update execution.

use crate::manifest::verify_manifest;
use crate::policy::check_version;
use crate::{ImageSource, OtaError, OtaResult, SlotBackend};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{info, warn};
use verdant_crypto::{Sha256Stream, TrustRoot};
use verdant_runtime::{AuditSink, LinkBits, LivenessToken, SHUTDOWN};
use verdant_store::{Store, StoreKeys};
use verdant_types::{Manifest, UpdateStatus};

/// Requests the platform reset into the trial slot.
pub trait ResetHook: Send {
    fn request_reset(&mut self);
}

impl<F> ResetHook for F
where
    F: FnMut() + Send,
{
    fn request_reset(&mut self) {
        self()
    }
}

/// Shared view of the last update outcome, read by the shadow reporter.
pub type StatusHandle = Arc<Mutex<UpdateStatus>>;

/// Drives a manifest through verification, download, and commit.
pub struct UpdatePipeline {
    store: Store,
    trust_root: TrustRoot,
    source: Box<dyn ImageSource>,
    slot: Box<dyn SlotBackend>,
    reset: Box<dyn ResetHook>,
    audit: AuditSink,
    status: StatusHandle,
}

impl UpdatePipeline {
    pub fn new(
        store: Store,
        trust_root: TrustRoot,
        source: Box<dyn ImageSource>,
        slot: Box<dyn SlotBackend>,
        reset: Box<dyn ResetHook>,
        audit: AuditSink,
    ) -> Self {
        Self {
            store,
            trust_root,
            source,
            slot,
            reset,
            audit,
            status: Arc::new(Mutex::new(UpdateStatus::Idle)),
        }
    }

    /// Cloneable handle for status reporting.
    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    /// The stored anti-rollback version; a fresh device reads 0.
    pub fn current_version(&self) -> u32 {
        self.store.load_u32(StoreKeys::OTA_VERSION).unwrap_or(0)
    }

    /// Run one manifest through the pipeline. Any failure before commit
    /// leaves the device exactly as it was, apart from audit entries.
    pub async fn apply(&mut self, manifest: &Manifest) -> OtaResult<u32> {
        let result = self.apply_inner(manifest).await;
        match &result {
            Ok(version) => {
                *self.status.lock().unwrap() = UpdateStatus::Succeeded;
                self.audit
                    .emit(format!("ota: committed version {version}, resetting"));
            }
            Err(err) => {
                *self.status.lock().unwrap() = UpdateStatus::Failed;
                self.audit.emit(format!("ota: rejected: {err}"));
            }
        }
        result
    }

    async fn apply_inner(&mut self, manifest: &Manifest) -> OtaResult<u32> {
        let verified = verify_manifest(manifest, &self.trust_root)?;
        let current = self.current_version();
        let required = check_version(current, &verified)?;
        info!(
            version = verified.version,
            current, required, "Manifest accepted, fetching image"
        );
        *self.status.lock().unwrap() = UpdateStatus::InProgress;

        self.slot.begin()?;
        let mut stream = self.source.open(&verified.url);
        let mut hasher = Sha256Stream::new();
        let mut total: u64 = 0;
        while let Some(item) = stream.recv().await {
            match item {
                Ok(chunk) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    if let Err(err) = self.slot.write(&chunk) {
                        self.slot.abort();
                        return Err(err);
                    }
                    hasher.update(&chunk);
                    total += chunk.len() as u64;
                }
                Err(err) => {
                    warn!(error = %err, received = total, "Download aborted");
                    self.slot.abort();
                    return Err(err);
                }
            }
        }
        if total == 0 {
            self.slot.abort();
            return Err(OtaError::DownloadIncomplete("empty image".into()));
        }

        // The hash covers exactly the bytes that landed in the slot.
        if hasher.finish() != verified.digest {
            warn!(received = total, "Image digest mismatch");
            self.slot.abort();
            return Err(OtaError::DigestMismatch);
        }

        self.slot
            .mark_pending()
            .map_err(|err| OtaError::CommitFailed(err.to_string()))?;
        // Version bump strictly before the reset: a crash in between
        // leaves the old slot running with a higher stored version, which
        // only strengthens anti-rollback.
        self.store
            .save_u32(StoreKeys::OTA_VERSION, verified.version)
            .map_err(|err| OtaError::CommitFailed(err.to_string()))?;

        self.reset.request_reset();
        Ok(verified.version)
    }

    /// First-boot confirmation of a pending image: cancels the boot
    /// loader's automatic rollback.
    pub fn confirm_boot(&mut self) -> OtaResult<()> {
        self.slot
            .confirm()
            .map_err(|err| OtaError::CommitFailed(err.to_string()))?;
        *self.status.lock().unwrap() = UpdateStatus::Succeeded;
        self.audit.emit("ota: new image confirmed");
        Ok(())
    }

    /// Startup hook: confirm a pending slot on the first successful boot.
    /// Returns whether anything was pending.
    pub fn confirm_boot_if_pending(&mut self) -> OtaResult<bool> {
        if self.slot.state() == crate::SlotState::PendingBoot {
            self.confirm_boot()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Record that the boot loader fell back to the previous slot.
    pub fn mark_reverted(&mut self) {
        *self.status.lock().unwrap() = UpdateStatus::Reverted;
        self.audit.emit("ota: boot loader reverted to previous slot");
    }

    /// Serve manifests from the cloud router until shutdown.
    pub async fn run(
        mut self,
        mut manifests: mpsc::Receiver<Manifest>,
        bits: Arc<LinkBits>,
        liveness: LivenessToken,
    ) {
        info!("Update pipeline started");
        loop {
            tokio::select! {
                _ = bits.wait_for(SHUTDOWN) => break,
                maybe_manifest = manifests.recv() => {
                    match maybe_manifest {
                        Some(manifest) => {
                            if let Err(err) = self.apply(&manifest).await {
                                warn!(error = %err, "Update rejected");
                            }
                        }
                        None => break,
                    }
                }
            }
            liveness.touch();
        }
        info!("Update pipeline stopped");
    }
}
