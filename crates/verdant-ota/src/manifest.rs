//! Manifest verification.

use crate::{OtaError, OtaResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use url::Url;
use verdant_crypto::{
    ecdsa_p256_verify, public_key_from_slot, sha256, verify_cert_chain, TrustRoot, SHA256_LEN,
};
use verdant_types::{Manifest, DIGEST_HEX_LEN};

/// A manifest that passed decode, signer resolution, and signature check.
#[derive(Debug, Clone)]
pub struct VerifiedManifest {
    pub url: String,
    pub digest: [u8; SHA256_LEN],
    pub version: u32,
    pub min_required: Option<u32>,
    pub allow_rollback: bool,
}

/// Verify a manifest end to end: decode the digest and signature, resolve
/// the signer through the trust root, and check the ECDSA signature over
/// the raw digest bytes.
pub fn verify_manifest(manifest: &Manifest, trust_root: &TrustRoot) -> OtaResult<VerifiedManifest> {
    Url::parse(&manifest.url)
        .map_err(|e| OtaError::ManifestInvalid(format!("url: {e}")))?;

    if manifest.digest.len() != DIGEST_HEX_LEN {
        return Err(OtaError::ManifestInvalid(format!(
            "digest must be {DIGEST_HEX_LEN} hex chars, got {}",
            manifest.digest.len()
        )));
    }
    let digest_bytes = hex::decode(&manifest.digest)
        .map_err(|_| OtaError::ManifestInvalid("digest not hex".into()))?;
    let mut digest = [0u8; SHA256_LEN];
    digest.copy_from_slice(&digest_bytes);

    let signature = BASE64
        .decode(&manifest.signature)
        .map_err(|_| OtaError::ManifestInvalid("signature not base64".into()))?;

    let signer_pub = resolve_signer(manifest, trust_root)?;

    ecdsa_p256_verify(&signer_pub, &digest, &signature)
        .map_err(|_| OtaError::SignatureInvalid)?;

    Ok(VerifiedManifest {
        url: manifest.url.clone(),
        digest,
        version: manifest.version,
        min_required: manifest.min_required,
        allow_rollback: manifest.rollback_allowed(),
    })
}

/// Resolve the signer public key: an explicit certificate must match the
/// optional key id and chain to a trust-root CA; otherwise the trust
/// root's device-cert slot is the signer.
fn resolve_signer(manifest: &Manifest, trust_root: &TrustRoot) -> OtaResult<Vec<u8>> {
    if let Some(cert_b64) = &manifest.signer_cert_b64 {
        let cert_der = BASE64
            .decode(cert_b64)
            .map_err(|_| OtaError::ManifestInvalid("signer cert not base64".into()))?;

        if let Some(keyid_hex) = &manifest.signer_keyid_hex {
            let computed = hex::encode(sha256(&cert_der));
            if !computed.eq_ignore_ascii_case(keyid_hex) {
                return Err(OtaError::KeyIdMismatch);
            }
        }

        if !trust_root.has_cas() {
            return Err(OtaError::ChainInvalid);
        }
        return verify_cert_chain(&cert_der, &trust_root.ca_certs)
            .map_err(|_| OtaError::ChainInvalid);
    }

    match &trust_root.device_cert {
        Some(blob) => public_key_from_slot(blob).map_err(|_| OtaError::Unauthorized),
        None => Err(OtaError::Unauthorized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::{Signature, SigningKey};
    use p256::elliptic_curve::sec1::ToEncodedPoint;

    fn signing_setup() -> (SigningKey, TrustRoot) {
        let key = SigningKey::random(&mut rand::thread_rng());
        let public = key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();
        let trust_root = TrustRoot {
            ca_certs: Vec::new(),
            device_cert: Some(public),
            device_key: None,
        };
        (key, trust_root)
    }

    fn signed_manifest(key: &SigningKey, digest: [u8; 32], version: u32) -> Manifest {
        let signature: Signature = key.sign(&digest);
        Manifest {
            url: "https://fw.verdant.garden/app.bin".into(),
            digest: hex::encode(digest),
            signature: BASE64.encode(signature.to_der().as_bytes()),
            version,
            min_required: None,
            signer_cert_b64: None,
            signer_keyid_hex: None,
            allow_rollback: None,
        }
    }

    #[test]
    fn valid_manifest_verifies() {
        let (key, root) = signing_setup();
        let digest = verdant_crypto::sha256(b"firmware image");
        let manifest = signed_manifest(&key, digest, 4);
        let verified = verify_manifest(&manifest, &root).unwrap();
        assert_eq!(verified.digest, digest);
        assert_eq!(verified.version, 4);
        assert!(!verified.allow_rollback);
    }

    #[test]
    fn wrong_digest_length_rejected() {
        let (key, root) = signing_setup();
        let mut manifest = signed_manifest(&key, [0u8; 32], 1);
        manifest.digest = "abcd".into();
        assert!(matches!(
            verify_manifest(&manifest, &root),
            Err(OtaError::ManifestInvalid(_))
        ));
    }

    #[test]
    fn non_hex_digest_rejected() {
        let (key, root) = signing_setup();
        let mut manifest = signed_manifest(&key, [0u8; 32], 1);
        manifest.digest = "zz".repeat(32);
        assert!(matches!(
            verify_manifest(&manifest, &root),
            Err(OtaError::ManifestInvalid(_))
        ));
    }

    #[test]
    fn bad_base64_signature_rejected() {
        let (key, root) = signing_setup();
        let mut manifest = signed_manifest(&key, [0u8; 32], 1);
        manifest.signature = "!!! not base64 !!!".into();
        assert!(matches!(
            verify_manifest(&manifest, &root),
            Err(OtaError::ManifestInvalid(_))
        ));
    }

    #[test]
    fn tampered_digest_fails_signature() {
        let (key, root) = signing_setup();
        let digest = verdant_crypto::sha256(b"firmware image");
        let mut manifest = signed_manifest(&key, digest, 1);
        // Signature stays over the old digest.
        let other = verdant_crypto::sha256(b"other image");
        manifest.digest = hex::encode(other);
        assert!(matches!(
            verify_manifest(&manifest, &root),
            Err(OtaError::SignatureInvalid)
        ));
    }

    #[test]
    fn foreign_signer_rejected() {
        let (_, root) = signing_setup();
        let foreign = SigningKey::random(&mut rand::thread_rng());
        let digest = verdant_crypto::sha256(b"firmware image");
        let manifest = signed_manifest(&foreign, digest, 1);
        assert!(matches!(
            verify_manifest(&manifest, &root),
            Err(OtaError::SignatureInvalid)
        ));
    }

    #[test]
    fn no_signer_anywhere_is_unauthorized() {
        let (key, _) = signing_setup();
        let manifest = signed_manifest(&key, [0u8; 32], 1);
        let empty_root = TrustRoot::default();
        assert!(matches!(
            verify_manifest(&manifest, &empty_root),
            Err(OtaError::Unauthorized)
        ));
    }

    #[test]
    fn keyid_mismatch_detected_before_chain() {
        let (key, root) = signing_setup();
        let mut manifest = signed_manifest(&key, [0u8; 32], 1);
        manifest.signer_cert_b64 = Some(BASE64.encode(b"some cert der"));
        manifest.signer_keyid_hex = Some("00".repeat(32));
        assert!(matches!(
            verify_manifest(&manifest, &root),
            Err(OtaError::KeyIdMismatch)
        ));
    }

    #[test]
    fn keyid_comparison_is_case_insensitive() {
        let (key, root) = signing_setup();
        let cert = b"some cert der";
        let mut manifest = signed_manifest(&key, [0u8; 32], 1);
        manifest.signer_cert_b64 = Some(BASE64.encode(cert));
        manifest.signer_keyid_hex = Some(hex::encode_upper(verdant_crypto::sha256(cert)));
        // Key id matches; the failure moves on to the (absent) CA chain.
        assert!(matches!(
            verify_manifest(&manifest, &root),
            Err(OtaError::ChainInvalid)
        ));
    }

    #[test]
    fn explicit_cert_without_cas_is_chain_invalid() {
        let (key, root) = signing_setup();
        let mut manifest = signed_manifest(&key, [0u8; 32], 1);
        manifest.signer_cert_b64 = Some(BASE64.encode(b"cert"));
        assert!(matches!(
            verify_manifest(&manifest, &root),
            Err(OtaError::ChainInvalid)
        ));
    }

    #[test]
    fn garbage_cert_with_cas_is_chain_invalid() {
        let (key, mut root) = signing_setup();
        root.ca_certs.push(b"garbage ca".to_vec());
        let mut manifest = signed_manifest(&key, [0u8; 32], 1);
        manifest.signer_cert_b64 = Some(BASE64.encode(b"garbage cert"));
        assert!(matches!(
            verify_manifest(&manifest, &root),
            Err(OtaError::ChainInvalid)
        ));
    }

    #[test]
    fn bad_url_rejected() {
        let (key, root) = signing_setup();
        let mut manifest = signed_manifest(&key, [0u8; 32], 1);
        manifest.url = "not a url".into();
        assert!(matches!(
            verify_manifest(&manifest, &root),
            Err(OtaError::ManifestInvalid(_))
        ));
    }
}
