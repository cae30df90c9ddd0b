//! Stored station credentials.

use crate::{NetError, NetResult};
use serde::{Deserialize, Serialize};
use verdant_store::{Store, StoreError, StoreKeys};

pub const MAX_SSID_LEN: usize = 32;
pub const MIN_PSK_LEN: usize = 8;
pub const MAX_PSK_LEN: usize = 64;

/// Station credentials, persisted as a JSON blob under `wifi_creds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredentials {
    pub ssid: String,
    /// Empty for open networks.
    pub psk: String,
}

impl WifiCredentials {
    pub fn new(ssid: impl Into<String>, psk: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            psk: psk.into(),
        }
    }

    /// Enforce 802.11 field limits: SSID 1–32 bytes, PSK empty (open) or
    /// 8–64 bytes.
    pub fn validate(&self) -> NetResult<()> {
        if self.ssid.is_empty() || self.ssid.len() > MAX_SSID_LEN {
            return Err(NetError::InvalidArgument(format!(
                "ssid must be 1..={MAX_SSID_LEN} bytes"
            )));
        }
        if !self.psk.is_empty() && (self.psk.len() < MIN_PSK_LEN || self.psk.len() > MAX_PSK_LEN) {
            return Err(NetError::InvalidArgument(format!(
                "psk must be empty or {MIN_PSK_LEN}..={MAX_PSK_LEN} bytes"
            )));
        }
        Ok(())
    }

    /// Load stored credentials, if any.
    pub fn load(store: &Store) -> NetResult<Option<Self>> {
        match store.load(StoreKeys::WIFI_CREDS) {
            Ok(bytes) => {
                let creds: WifiCredentials = serde_json::from_slice(&bytes)
                    .map_err(|e| NetError::InvalidArgument(format!("stored creds: {e}")))?;
                Ok(Some(creds))
            }
            Err(StoreError::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Persist after validation.
    pub fn save(&self, store: &Store) -> NetResult<()> {
        self.validate()?;
        let bytes = serde_json::to_vec(self)
            .map_err(|e| NetError::InvalidArgument(format!("encode creds: {e}")))?;
        store.save(StoreKeys::WIFI_CREDS, &bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use verdant_store::MemoryKv;

    fn store() -> Store {
        Store::new(Arc::new(MemoryKv::new()))
    }

    #[test]
    fn valid_credentials_pass() {
        WifiCredentials::new("Lab", "secret-psk").validate().unwrap();
    }

    #[test]
    fn open_network_psk_is_allowed() {
        WifiCredentials::new("Open", "").validate().unwrap();
    }

    #[test]
    fn empty_ssid_rejected() {
        assert!(WifiCredentials::new("", "secret-psk").validate().is_err());
    }

    #[test]
    fn oversized_ssid_rejected() {
        let ssid = "s".repeat(MAX_SSID_LEN + 1);
        assert!(WifiCredentials::new(ssid, "secret-psk").validate().is_err());
    }

    #[test]
    fn short_psk_rejected() {
        assert!(WifiCredentials::new("Lab", "short").validate().is_err());
    }

    #[test]
    fn oversized_psk_rejected() {
        let psk = "p".repeat(MAX_PSK_LEN + 1);
        assert!(WifiCredentials::new("Lab", psk).validate().is_err());
    }

    #[test]
    fn save_load_roundtrip() {
        let store = store();
        let creds = WifiCredentials::new("Lab", "super-secret");
        creds.save(&store).unwrap();
        assert_eq!(WifiCredentials::load(&store).unwrap().unwrap(), creds);
    }

    #[test]
    fn load_without_save_is_none() {
        assert!(WifiCredentials::load(&store()).unwrap().is_none());
    }

    #[test]
    fn save_rejects_invalid() {
        let store = store();
        assert!(WifiCredentials::new("", "").save(&store).is_err());
        assert!(WifiCredentials::load(&store).unwrap().is_none());
    }
}
