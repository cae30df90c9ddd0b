//! Durable configuration store for the Verdant controller.
//!
//! Small opaque blobs with a CRC32 integrity trailer and a hot spare per
//! key. Writes land on the spare first, then the primary; reads fall back
//! to the spare and repair the primary in place. The backing medium is a
//! wear-leveled key-value namespace supplied through [`KvBackend`].

mod backend;
mod keys;
mod store;

pub use backend::{BackendHealth, FileKv, KvBackend, MemoryKv};
pub use keys::StoreKeys;
pub use store::{Store, MAX_KEY_LEN, SPARE_SUFFIX};

use thiserror::Error;

/// Errors from store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Neither the primary nor the spare entry exists.
    #[error("Key not found")]
    NotFound,
    /// Entries exist but no copy passed its integrity check.
    #[error("Both copies failed integrity check")]
    Integrity,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Out of memory")]
    NoMemory,
    /// Underlying medium failure.
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
