//! Firmware update pipeline for the Verdant controller.
//!
//! Verifies signed manifests against the factory trust root, enforces the
//! anti-rollback version policy, streams the image into the alternate slot
//! while hashing it, and commits atomically: the stored version is bumped
//! strictly before the reset, and an image that fails to confirm on its
//! first boot is reverted by the boot loader.

mod fetch;
mod manifest;
mod pipeline;
mod policy;
mod slot;

pub use fetch::{HttpImageSource, ImageSource, ImageStream, MemoryImageSource};
pub use manifest::{verify_manifest, VerifiedManifest};
pub use pipeline::{ResetHook, StatusHandle, UpdatePipeline};
pub use policy::check_version;
pub use slot::{MemorySlot, SlotBackend, SlotState};

use thiserror::Error;

/// Failure taxonomy of the update pipeline. Every variant before
/// `CommitFailed` leaves the device on the previous slot.
#[derive(Error, Debug)]
pub enum OtaError {
    #[error("Manifest invalid: {0}")]
    ManifestInvalid(String),
    #[error("Manifest signature invalid")]
    SignatureInvalid,
    #[error("Signer certificate chain invalid")]
    ChainInvalid,
    #[error("Signer key id mismatch")]
    KeyIdMismatch,
    /// No signer could be resolved from the manifest or the trust root.
    #[error("No authorized signer")]
    Unauthorized,
    #[error("Version {offered} rejected (anti-rollback at {current})")]
    VersionRejected { current: u32, offered: u32 },
    #[error("Download incomplete: {0}")]
    DownloadIncomplete(String),
    #[error("Image digest mismatch")]
    DigestMismatch,
    #[error("Commit failed: {0}")]
    CommitFailed(String),
    #[error("Slot error: {0}")]
    Slot(String),
    #[error("Store error: {0}")]
    Store(#[from] verdant_store::StoreError),
}

/// Result type for update operations.
pub type OtaResult<T> = Result<T, OtaError>;
