//! Network supervisor for the Verdant controller.
//!
//! Owns the Wi-Fi link lifecycle: applies stored credentials at boot,
//! tracks connect/disconnect events from the driver, enforces the retry
//! budget, and publishes the `WIFI_UP`/`TIME_SYNCED` bits plus the
//! link-stability timestamp the commissioning arbiter reads.

mod creds;
mod driver;
mod supervisor;

pub use creds::{WifiCredentials, MAX_PSK_LEN, MAX_SSID_LEN, MIN_PSK_LEN};
pub use driver::{MemoryWifi, WifiDriver, WifiEvent};
pub use supervisor::{NetCommand, NetHandle, NetworkSupervisor, SupervisorState, MAX_RETRY};

use thiserror::Error;

/// Errors from the network supervisor.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Invalid credentials: {0}")]
    InvalidArgument(String),
    #[error("Driver error: {0}")]
    Driver(String),
    #[error("Store error: {0}")]
    Store(#[from] verdant_store::StoreError),
    #[error("Supervisor is gone")]
    Closed,
}

/// Result type for network operations.
pub type NetResult<T> = Result<T, NetError>;
