//! Frames accepted on the local commissioning channel.
//!
//! The channel carries UTF-8 JSON before a session exists (provisioning
//! and handshake frames, detected by a leading `{`) and AEAD-sealed binary
//! frames afterwards. The sealed-frame plaintext is also JSON.

use serde::{Deserialize, Serialize};

/// Command discriminator carried by the handshake frame.
pub const HANDSHAKE_CMD: &str = "handshake";

/// Plaintext provisioning frame: installs Wi-Fi credentials and optionally
/// the schedule timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningFrame {
    pub ssid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tz: Option<String>,
}

/// Session-establishment frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeFrame {
    /// Must equal [`HANDSHAKE_CMD`].
    pub cmd: String,
    /// Uncompressed P-256 public key, 130 hex chars (65 bytes).
    pub client_pub: String,
    /// Proof-of-possession secret bound into the session KDF.
    pub pop: String,
}

/// Decrypted control-frame payload.
///
/// Missing actuator fields mean "keep the current value"; `ctr` drives the
/// anti-replay window and becomes the command sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFrame {
    pub ctr: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ramp_ms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pump: Option<u8>,
}
