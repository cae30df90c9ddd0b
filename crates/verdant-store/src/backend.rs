//! Backing-medium abstraction and the two stock implementations.

use crate::{StoreError, StoreResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Health of the backing namespace, checked once at open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendHealth {
    Ok,
    /// The namespace has no free pages left and must be erased.
    NoFreePages,
    /// The on-medium layout version is unknown to this firmware.
    VersionMismatch,
}

/// A wear-leveled key→blob namespace.
///
/// Implementations must make `put` atomic per key: a torn write may lose
/// the new value but never corrupt an unrelated key.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()>;
    fn delete(&self, key: &str) -> StoreResult<()>;
    /// Erase the whole namespace.
    fn wipe(&self) -> StoreResult<()>;
    fn health(&self) -> BackendHealth;
}

/// In-memory backend for tests and ephemeral configurations.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    health: Mutex<BackendHealth>,
}

impl Default for BackendHealth {
    fn default() -> Self {
        BackendHealth::Ok
    }
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the next health check to report `health` (test hook).
    pub fn set_health(&self, health: BackendHealth) {
        *self.health.lock().unwrap() = health;
    }

    /// Overwrite an entry without any framing (test hook for corruption).
    pub fn corrupt(&self, key: &str, raw: &[u8]) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), raw.to_vec());
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvBackend for MemoryKv {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    fn wipe(&self) -> StoreResult<()> {
        self.entries.lock().unwrap().clear();
        *self.health.lock().unwrap() = BackendHealth::Ok;
        Ok(())
    }

    fn health(&self) -> BackendHealth {
        *self.health.lock().unwrap()
    }
}

/// File-per-key backend. Writes go to a temp file first and land with an
/// atomic rename.
pub struct FileKv {
    root: PathBuf,
}

impl FileKv {
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        if key.is_empty()
            || !key
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        {
            return Err(StoreError::InvalidArgument(format!(
                "key must be non-empty [a-z0-9_]: {key:?}"
            )));
        }
        Ok(self.root.join(key))
    }
}

impl KvBackend for FileKv {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let path = self.path_for(key)?;
        let tmp = self.root.join(format!(".{key}.tmp"));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn wipe(&self) -> StoreResult<()> {
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                std::fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    fn health(&self) -> BackendHealth {
        BackendHealth::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_put_get_delete() {
        let kv = MemoryKv::new();
        assert!(kv.get("a").unwrap().is_none());
        kv.put("a", b"one").unwrap();
        assert_eq!(kv.get("a").unwrap().unwrap(), b"one");
        kv.delete("a").unwrap();
        assert!(kv.get("a").unwrap().is_none());
    }

    #[test]
    fn memory_wipe_clears_and_heals() {
        let kv = MemoryKv::new();
        kv.put("a", b"one").unwrap();
        kv.set_health(BackendHealth::NoFreePages);
        kv.wipe().unwrap();
        assert!(kv.is_empty());
        assert_eq!(kv.health(), BackendHealth::Ok);
    }

    #[test]
    fn file_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::open(dir.path()).unwrap();
        kv.put("wifi_creds", b"blob").unwrap();
        assert_eq!(kv.get("wifi_creds").unwrap().unwrap(), b"blob");
    }

    #[test]
    fn file_get_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::open(dir.path()).unwrap();
        assert!(kv.get("nothing").unwrap().is_none());
    }

    #[test]
    fn file_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::open(dir.path()).unwrap();
        kv.put("k", b"v").unwrap();
        kv.delete("k").unwrap();
        kv.delete("k").unwrap();
        assert!(kv.get("k").unwrap().is_none());
    }

    #[test]
    fn file_rejects_hostile_keys() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::open(dir.path()).unwrap();
        assert!(kv.put("../escape", b"v").is_err());
        assert!(kv.put("UPPER", b"v").is_err());
        assert!(kv.put("", b"v").is_err());
    }

    #[test]
    fn file_wipe_removes_entries() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::open(dir.path()).unwrap();
        kv.put("a", b"1").unwrap();
        kv.put("b", b"2").unwrap();
        kv.wipe().unwrap();
        assert!(kv.get("a").unwrap().is_none());
        assert!(kv.get("b").unwrap().is_none());
    }

    #[test]
    fn file_overwrite_replaces_value() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::open(dir.path()).unwrap();
        kv.put("k", b"old").unwrap();
        kv.put("k", b"new").unwrap();
        assert_eq!(kv.get("k").unwrap().unwrap(), b"new");
    }
}
