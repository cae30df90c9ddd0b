//! Factory trust-root blob.
//!
//! A TLV container installed on a flash partition at manufacture. The
//! device only reads it: a CA set for manifest signer chains, the device
//! certificate, and the device private key.

use crate::{CryptoError, CryptoResult};

/// Container header: magic plus layout version 1.
pub const TRUST_ROOT_MAGIC: [u8; 5] = *b"SPCF\x01";

const TYPE_CA: u8 = 1;
const TYPE_DEVICE_CERT: u8 = 2;
const TYPE_DEVICE_KEY: u8 = 3;

/// Parsed trust-root contents.
#[derive(Debug, Clone, Default)]
pub struct TrustRoot {
    /// Trusted CA certificates, DER.
    pub ca_certs: Vec<Vec<u8>>,
    /// Device certificate, DER.
    pub device_cert: Option<Vec<u8>>,
    /// Device private key blob (opaque to this crate).
    pub device_key: Option<Vec<u8>>,
}

impl TrustRoot {
    /// Parse a trust-root blob.
    ///
    /// Unknown record types are skipped; a truncated final record ends
    /// parsing without error. Only the header is mandatory.
    pub fn parse(blob: &[u8]) -> CryptoResult<Self> {
        if blob.len() < TRUST_ROOT_MAGIC.len() || blob[..TRUST_ROOT_MAGIC.len()] != TRUST_ROOT_MAGIC
        {
            return Err(CryptoError::InvalidArgument("trust-root header".into()));
        }

        let mut root = TrustRoot::default();
        let mut offset = TRUST_ROOT_MAGIC.len();
        while blob.len() - offset >= 5 {
            let record_type = blob[offset];
            let mut len_bytes = [0u8; 4];
            len_bytes.copy_from_slice(&blob[offset + 1..offset + 5]);
            let len = u32::from_le_bytes(len_bytes) as usize;
            offset += 5;
            if blob.len() - offset < len {
                // Truncated final TLV: stop cleanly.
                break;
            }
            let value = blob[offset..offset + len].to_vec();
            offset += len;
            match record_type {
                TYPE_CA => root.ca_certs.push(value),
                TYPE_DEVICE_CERT => root.device_cert = Some(value),
                TYPE_DEVICE_KEY => root.device_key = Some(value),
                _ => {}
            }
        }
        Ok(root)
    }

    /// Serialize back to the on-flash layout (used by tests and the
    /// factory tool).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = TRUST_ROOT_MAGIC.to_vec();
        let mut push = |record_type: u8, value: &[u8]| {
            out.push(record_type);
            out.extend_from_slice(&(value.len() as u32).to_le_bytes());
            out.extend_from_slice(value);
        };
        for ca in &self.ca_certs {
            push(TYPE_CA, ca);
        }
        if let Some(cert) = &self.device_cert {
            push(TYPE_DEVICE_CERT, cert);
        }
        if let Some(key) = &self.device_key {
            push(TYPE_DEVICE_KEY, key);
        }
        out
    }

    /// Whether any CA is present.
    pub fn has_cas(&self) -> bool {
        !self.ca_certs.is_empty()
    }
}
