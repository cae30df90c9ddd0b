//! CRC-framed store with hot-spare repair.

use crate::{BackendHealth, KvBackend, StoreError, StoreResult};
use std::sync::Arc;
use tracing::{info, warn};

/// Longest user-visible key; the spare suffix is added on top.
pub const MAX_KEY_LEN: usize = 16;

/// Suffix of the hot-spare entry for each logical key.
pub const SPARE_SUFFIX: &str = "_bak";

const CRC_LEN: usize = 4;

/// The durable store. Cheap to clone; all clones share one backend.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn KvBackend>,
}

impl Store {
    /// Open the store, repairing the namespace when the backend reports it
    /// unusable (out of free pages or an unknown layout version).
    pub fn open(backend: Arc<dyn KvBackend>) -> StoreResult<Self> {
        match backend.health() {
            BackendHealth::Ok => {}
            health @ (BackendHealth::NoFreePages | BackendHealth::VersionMismatch) => {
                warn!(?health, "Store namespace unusable, erasing and reinitializing");
                backend.wipe()?;
            }
        }
        Ok(Self { backend })
    }

    /// Wrap a backend without the health check (tests and nested handles).
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    /// Persist `payload` under `key`: spare first, then primary, each as
    /// `payload ‖ CRC32(payload)`.
    pub fn save(&self, key: &str, payload: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        let framed = frame(payload);
        self.backend.put(&spare_key(key), &framed)?;
        self.backend.put(key, &framed)?;
        Ok(())
    }

    /// Load the blob stored under `key`.
    ///
    /// Tries the primary entry first. A missing or corrupt primary falls
    /// back to the spare; a valid spare is written back to the primary
    /// before returning.
    pub fn load(&self, key: &str) -> StoreResult<Vec<u8>> {
        validate_key(key)?;
        let primary = self.backend.get(key)?;
        if let Some(payload) = primary.as_deref().and_then(unframe) {
            return Ok(payload.to_vec());
        }

        let spare = self.backend.get(&spare_key(key))?;
        if let Some(payload) = spare.as_deref().and_then(unframe) {
            info!(key, "Primary entry invalid, repaired from spare");
            let payload = payload.to_vec();
            self.backend.put(key, &frame(&payload))?;
            return Ok(payload);
        }

        if primary.is_none() && spare.is_none() {
            Err(StoreError::NotFound)
        } else {
            Err(StoreError::Integrity)
        }
    }

    /// Remove both copies of `key`.
    pub fn delete(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        self.backend.delete(key)?;
        self.backend.delete(&spare_key(key))?;
        Ok(())
    }

    /// Whether `key` loads cleanly.
    pub fn contains(&self, key: &str) -> bool {
        self.load(key).is_ok()
    }

    pub fn save_u32(&self, key: &str, value: u32) -> StoreResult<()> {
        self.save(key, &value.to_le_bytes())
    }

    pub fn load_u32(&self, key: &str) -> StoreResult<u32> {
        let bytes = self.load(key)?;
        let arr: [u8; 4] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::InvalidArgument(format!("{key}: not a u32 blob")))?;
        Ok(u32::from_le_bytes(arr))
    }

    pub fn save_u64(&self, key: &str, value: u64) -> StoreResult<()> {
        self.save(key, &value.to_le_bytes())
    }

    pub fn load_u64(&self, key: &str) -> StoreResult<u64> {
        let bytes = self.load(key)?;
        let arr: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::InvalidArgument(format!("{key}: not a u64 blob")))?;
        Ok(u64::from_le_bytes(arr))
    }
}

fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(StoreError::InvalidArgument(format!(
            "key length must be 1..={MAX_KEY_LEN}: {key:?}"
        )));
    }
    Ok(())
}

fn spare_key(key: &str) -> String {
    format!("{key}{SPARE_SUFFIX}")
}

fn frame(payload: &[u8]) -> Vec<u8> {
    let crc = crc32fast::hash(payload);
    let mut framed = Vec::with_capacity(payload.len() + CRC_LEN);
    framed.extend_from_slice(payload);
    framed.extend_from_slice(&crc.to_le_bytes());
    framed
}

fn unframe(entry: &[u8]) -> Option<&[u8]> {
    if entry.len() < CRC_LEN {
        return None;
    }
    let (payload, trailer) = entry.split_at(entry.len() - CRC_LEN);
    let stored = u32::from_le_bytes(trailer.try_into().ok()?);
    if crc32fast::hash(payload) == stored {
        Some(payload)
    } else {
        None
    }
}
