//! Jobs notify-next routing.

use crate::{CloudError, CloudResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use tracing::warn;
use verdant_crypto::{ecdsa_p256_verify, public_key_from_slot, TrustRoot};
use verdant_types::Manifest;

/// The deprecated job body: the signature covers only the URL, not the
/// image, which is why this path is disabled unless explicitly enabled.
#[derive(Debug, Deserialize)]
struct LegacyJob {
    #[serde(rename = "jobId")]
    #[allow(dead_code)]
    job_id: String,
    ota_url: String,
    /// Base64 DER ECDSA signature over the URL bytes.
    signature: String,
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    digest: Option<String>,
}

/// Extract the update manifest from a jobs notify-next body, if it carries
/// one.
///
/// A `manifest` object is forwarded as-is. The legacy `{jobId, ota_url,
/// signature}` shape is rejected unless `legacy_compat` is set; with the
/// flag on, the URL signature is checked against the trust-root device
/// certificate and a manifest is synthesized, which still has to pass the
/// full manifest verification downstream.
pub fn route_job(
    payload: &[u8],
    legacy_compat: bool,
    trust_root: &TrustRoot,
) -> CloudResult<Option<Manifest>> {
    let value: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| CloudError::InvalidMessage(format!("job body: {e}")))?;

    if let Some(manifest_value) = value.get("manifest") {
        let manifest: Manifest = serde_json::from_value(manifest_value.clone())
            .map_err(|e| CloudError::InvalidMessage(format!("manifest: {e}")))?;
        return Ok(Some(manifest));
    }

    if value.get("ota_url").is_none() {
        // A job notification with nothing for us (e.g. a pure status ping).
        return Ok(None);
    }

    if !legacy_compat {
        warn!("Legacy ota_url job received and rejected");
        return Err(CloudError::LegacyDisabled);
    }

    let job: LegacyJob = serde_json::from_value(value)
        .map_err(|e| CloudError::InvalidMessage(format!("legacy job: {e}")))?;

    let signer = trust_root
        .device_cert
        .as_deref()
        .ok_or(CloudError::Unauthorized)
        .and_then(|blob| public_key_from_slot(blob).map_err(|_| CloudError::Unauthorized))?;
    let signature = BASE64
        .decode(&job.signature)
        .map_err(|e| CloudError::InvalidMessage(format!("legacy signature: {e}")))?;
    ecdsa_p256_verify(&signer, job.ota_url.as_bytes(), &signature)
        .map_err(|_| CloudError::Unauthorized)?;

    Ok(Some(Manifest {
        url: job.ota_url,
        digest: job.digest.unwrap_or_default(),
        signature: job.signature,
        version: job.version.unwrap_or(0),
        min_required: None,
        signer_cert_b64: None,
        signer_keyid_hex: None,
        allow_rollback: None,
    }))
}
