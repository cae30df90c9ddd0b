//! Signature and certificate verification.
//!
//! The device only ever verifies; signing happens in the fleet backend.
//! Certificates are expected to be ECDSA-P256 over SHA-256, which is what
//! the factory provisioning chain issues.

use crate::{CryptoError, CryptoResult};
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use x509_parser::prelude::*;

/// Verify an ECDSA-P256/SHA-256 signature (DER encoded) over `message`.
///
/// `pub_sec1` is the signer's public key in SEC1 form (compressed or
/// uncompressed). Returns `Auth` on a well-formed but wrong signature.
pub fn ecdsa_p256_verify(pub_sec1: &[u8], message: &[u8], sig_der: &[u8]) -> CryptoResult<()> {
    let key = VerifyingKey::from_sec1_bytes(pub_sec1)
        .map_err(|_| CryptoError::InvalidArgument("signer public key".into()))?;
    let signature = Signature::from_der(sig_der)
        .map_err(|_| CryptoError::InvalidArgument("signature DER".into()))?;
    key.verify(message, &signature)
        .map_err(|_| CryptoError::Auth)
}

/// The pieces of a certificate the update pipeline needs.
#[derive(Debug, Clone)]
pub struct ParsedCert {
    /// Subject public key, SEC1 encoded.
    pub public_key_sec1: Vec<u8>,
    /// Raw DER of the to-be-signed portion.
    pub tbs_raw: Vec<u8>,
    /// Issuer signature over the TBS bytes, DER encoded.
    pub signature_der: Vec<u8>,
}

/// Parse a DER certificate and pull out the fields we verify against.
pub fn parse_cert_der(der: &[u8]) -> CryptoResult<ParsedCert> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| CryptoError::InvalidArgument(format!("certificate DER: {e}")))?;
    Ok(ParsedCert {
        public_key_sec1: cert.public_key().subject_public_key.data.as_ref().to_vec(),
        tbs_raw: cert.tbs_certificate.as_ref().to_vec(),
        signature_der: cert.signature_value.data.as_ref().to_vec(),
    })
}

/// Extract the public key from a trust-root device-cert slot.
///
/// The slot carries either a DER certificate or, on images provisioned by
/// the lightweight factory tool, a bare uncompressed P-256 public key.
pub fn public_key_from_slot(blob: &[u8]) -> CryptoResult<Vec<u8>> {
    if blob.len() == 65 && blob[0] == 0x04 {
        return Ok(blob.to_vec());
    }
    parse_cert_der(blob).map(|cert| cert.public_key_sec1)
}

/// Verify that `leaf_der` was issued by one of the trust-root CAs.
///
/// Returns the leaf's public key on success so the caller can use it to
/// check the payload signature without reparsing.
pub fn verify_cert_chain(leaf_der: &[u8], ca_ders: &[Vec<u8>]) -> CryptoResult<Vec<u8>> {
    if ca_ders.is_empty() {
        return Err(CryptoError::InvalidArgument("empty CA set".into()));
    }
    let leaf = parse_cert_der(leaf_der)?;
    for ca_der in ca_ders {
        let ca = match parse_cert_der(ca_der) {
            Ok(ca) => ca,
            // A malformed CA record must not mask a valid one further on.
            Err(_) => continue,
        };
        if ecdsa_p256_verify(&ca.public_key_sec1, &leaf.tbs_raw, &leaf.signature_der).is_ok() {
            return Ok(leaf.public_key_sec1);
        }
    }
    Err(CryptoError::Auth)
}
