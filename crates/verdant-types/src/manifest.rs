//! Firmware update manifest.

use serde::{Deserialize, Serialize};

/// Expected length of the hex-encoded image digest (32 bytes).
pub const DIGEST_HEX_LEN: usize = 64;

/// A signed firmware update descriptor, delivered over the cloud link or
/// the local channel.
///
/// The signature covers the raw 32 digest bytes under ECDSA-P256/SHA-256.
/// The optional signer certificate must chain to a CA in the trust root;
/// without one, the trust root's device certificate is the signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// HTTPS location of the image.
    pub url: String,
    /// SHA-256 of the full image, hex encoded (exactly 64 chars).
    pub digest: String,
    /// ECDSA signature over the raw digest bytes, base64 DER.
    pub signature: String,
    /// Image version; compared against the anti-rollback counter.
    pub version: u32,
    /// Minimum version the fleet requires; forces the update when the
    /// running version is older, even at equal `version`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_required: Option<u32>,
    /// Optional signer certificate, base64 DER.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_cert_b64: Option<String>,
    /// Optional SHA-256 of the signer certificate DER, hex encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_keyid_hex: Option<String>,
    /// Explicit opt-in to installing an older or equal version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_rollback: Option<bool>,
}

impl Manifest {
    /// Whether rollback was explicitly allowed.
    pub fn rollback_allowed(&self) -> bool {
        self.allow_rollback.unwrap_or(false)
    }
}
