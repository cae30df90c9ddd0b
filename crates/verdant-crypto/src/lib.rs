//! Crypto primitives for the Verdant controller.
//!
//! Everything the coordination fabric needs and nothing more: P-256 ECDH
//! for the commissioning handshake, HKDF-SHA256 key derivation, AES-256-GCM
//! framing, SHA-256 (one-shot and streaming) for image digests, ECDSA-P256
//! verification for manifests and certificates, and the factory trust-root
//! TLV container.

mod ecdh;
mod primitives;
mod trustroot;
mod verify;

pub use ecdh::{EphemeralKeypair, PUBLIC_KEY_LEN, SHARED_SECRET_LEN};
pub use primitives::{
    aead_open, aead_seal, hkdf_sha256, sha256, Sha256Stream, AEAD_IV_LEN, AEAD_KEY_LEN,
    AEAD_TAG_LEN, SHA256_LEN,
};
pub use trustroot::{TrustRoot, TRUST_ROOT_MAGIC};
pub use verify::{
    ecdsa_p256_verify, parse_cert_der, public_key_from_slot, verify_cert_chain, ParsedCert,
};

use thiserror::Error;

/// Errors from crypto operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// AEAD tag or signature verification failed.
    #[error("Authentication failed")]
    Auth,
    #[error("Crypto failure: {0}")]
    Crypto(String),
    #[error("Out of memory")]
    OutOfMemory,
}

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
