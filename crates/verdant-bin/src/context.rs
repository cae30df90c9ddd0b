//! Shared application context.

use crate::config::Config;
use std::sync::Arc;
use tracing::warn;
use verdant_control::{ActuatorSnapshot, CommandQueue, SharedSnapshot};
use verdant_crypto::TrustRoot;
use verdant_runtime::{audit_channel, AuditQueue, AuditSink, LinkBits, Liveness};
use verdant_store::{FileKv, KvBackend, MemoryKv, Store};

/// Depth of the audit intake queue.
const AUDIT_QUEUE_DEPTH: usize = 64;

/// The process-wide singletons, created once at startup and handed to
/// every task. Tests construct a fresh context per case.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Store,
    pub bits: Arc<LinkBits>,
    pub liveness: Arc<Liveness>,
    pub queue: Arc<CommandQueue>,
    pub snapshot: SharedSnapshot,
    pub audit: AuditSink,
    pub trust_root: TrustRoot,
}

impl AppContext {
    /// Build the context over the configured file-backed store.
    pub fn new(config: Config) -> anyhow::Result<(Self, AuditQueue)> {
        let backend: Arc<dyn KvBackend> = Arc::new(FileKv::open(&config.data_dir)?);
        Self::with_backend(config, backend)
    }

    /// Build an in-memory context (tests, `status` on a fresh unit).
    pub fn in_memory(config: Config) -> anyhow::Result<(Self, AuditQueue)> {
        Self::with_backend(config, Arc::new(MemoryKv::new()))
    }

    fn with_backend(
        config: Config,
        backend: Arc<dyn KvBackend>,
    ) -> anyhow::Result<(Self, AuditQueue)> {
        let store = Store::open(backend)?;
        let trust_root = load_trust_root(&config);
        let (audit, audit_queue) = audit_channel(AUDIT_QUEUE_DEPTH);
        let context = Self {
            config: Arc::new(config),
            store,
            bits: Arc::new(LinkBits::new()),
            liveness: Arc::new(Liveness::new()),
            queue: Arc::new(CommandQueue::with_default_capacity()),
            snapshot: ActuatorSnapshot::new_shared(),
            audit,
            trust_root,
        };
        Ok((context, audit_queue))
    }

    /// The 6-byte identifier advertised on the local channel, derived
    /// from the device name.
    pub fn local_device_id(&self) -> [u8; 6] {
        let digest = verdant_crypto::sha256(self.config.device_id.as_bytes());
        let mut id = [0u8; 6];
        id.copy_from_slice(&digest[..6]);
        id
    }
}

fn load_trust_root(config: &Config) -> TrustRoot {
    let Some(path) = &config.trust_root_path else {
        warn!("No trust-root path configured; update manifests cannot verify");
        return TrustRoot::default();
    };
    match std::fs::read(path) {
        Ok(blob) => match TrustRoot::parse(&blob) {
            Ok(root) => root,
            Err(err) => {
                warn!(error = %err, path = %path.display(), "Trust-root blob unparsable");
                TrustRoot::default()
            }
        },
        Err(err) => {
            warn!(error = %err, path = %path.display(), "Trust-root blob unreadable");
            TrustRoot::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_context_builds() {
        let (context, _audit_queue) = AppContext::in_memory(Config::default()).unwrap();
        assert!(context.queue.is_empty());
        assert_eq!(context.trust_root.ca_certs.len(), 0);
    }

    #[test]
    fn local_device_id_is_stable_per_name() {
        let (a, _qa) = AppContext::in_memory(Config::default()).unwrap();
        let (b, _qb) = AppContext::in_memory(Config::default()).unwrap();
        assert_eq!(a.local_device_id(), b.local_device_id());

        let mut other = Config::default();
        other.device_id = "grow-2".into();
        let (c, _qc) = AppContext::in_memory(other).unwrap();
        assert_ne!(a.local_device_id(), c.local_device_id());
    }

    #[test]
    fn trust_root_loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust.bin");
        let root = TrustRoot {
            ca_certs: vec![b"ca".to_vec()],
            device_cert: None,
            device_key: None,
        };
        std::fs::write(&path, root.to_bytes()).unwrap();

        let mut config = Config::default();
        config.trust_root_path = Some(path);
        let (context, _q) = AppContext::in_memory(config).unwrap();
        assert_eq!(context.trust_root.ca_certs, vec![b"ca".to_vec()]);
    }

    #[test]
    fn file_backed_context_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = dir.path().join("data");
        let (context, _q) = AppContext::new(config.clone()).unwrap();
        context.store.save("k", b"v").unwrap();
        drop(context);

        let (reopened, _q) = AppContext::new(config).unwrap();
        assert_eq!(reopened.store.load("k").unwrap(), b"v");
    }
}
