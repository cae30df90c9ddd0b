//! Local commissioning channel for the Verdant controller.
//!
//! Two cooperating pieces: the arbiter, a timer-driven state machine that
//! decides *when* the short-range channel advertises, and the session
//! server, which speaks the channel protocol: plaintext JSON provisioning
//! frames, a PoP-bound ECDH handshake, and AEAD-sealed control frames with
//! a persisted anti-replay window.

mod arbiter;
mod replay;
mod session;
mod transport;

pub use arbiter::{ArbiterConfig, ArbiterHandle, CommissioningArbiter};
pub use replay::ReplayWindow;
pub use session::{ProvisioningHandler, SessionMetrics, SessionServer};
pub use transport::{short_name, BeaconTransport, MemoryBeacon, DEVICE_ID_LEN, MAX_FRAME_LEN};

use thiserror::Error;

/// Errors from the commissioning channel.
#[derive(Error, Debug)]
pub enum CommissioningError {
    #[error("Malformed frame: {0}")]
    Malformed(String),
    #[error("Provisioning rejected: {0}")]
    Provisioning(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Store error: {0}")]
    Store(#[from] verdant_store::StoreError),
    #[error("Crypto error: {0}")]
    Crypto(#[from] verdant_crypto::CryptoError),
}

/// Result type for commissioning operations.
pub type CommResult<T> = Result<T, CommissioningError>;
