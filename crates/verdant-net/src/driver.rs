//! Wi-Fi driver seam.

use crate::NetResult;
use std::sync::{Arc, Mutex};

/// Events the MAC/IP stack reports to the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiEvent {
    /// Station associated and got an address.
    Connected,
    Disconnected { reason: String },
    /// The time transport (SNTP or equivalent) reached sync.
    TimeSynced,
}

/// The station interface as the supervisor sees it.
///
/// Events arrive separately, over the channel handed to the supervisor;
/// the trait only carries the imperative half.
pub trait WifiDriver: Send {
    fn configure(&mut self, ssid: &str, psk: &str) -> NetResult<()>;
    fn connect(&mut self) -> NetResult<()>;
    fn disconnect(&mut self) -> NetResult<()>;
    /// Last measured signal strength, dBm.
    fn rssi(&self) -> Option<i8>;
}

/// Recording driver for tests.
#[derive(Default, Clone)]
pub struct MemoryWifi {
    state: Arc<Mutex<MemoryWifiState>>,
}

#[derive(Default)]
struct MemoryWifiState {
    configured: Option<(String, String)>,
    connect_calls: u32,
    disconnect_calls: u32,
    rssi: Option<i8>,
    fail_connect: bool,
}

impl MemoryWifi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configured(&self) -> Option<(String, String)> {
        self.state.lock().unwrap().configured.clone()
    }

    pub fn connect_calls(&self) -> u32 {
        self.state.lock().unwrap().connect_calls
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.state.lock().unwrap().disconnect_calls
    }

    pub fn set_rssi(&self, rssi: Option<i8>) {
        self.state.lock().unwrap().rssi = rssi;
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state.lock().unwrap().fail_connect = fail;
    }
}

impl WifiDriver for MemoryWifi {
    fn configure(&mut self, ssid: &str, psk: &str) -> NetResult<()> {
        self.state.lock().unwrap().configured = Some((ssid.to_string(), psk.to_string()));
        Ok(())
    }

    fn connect(&mut self) -> NetResult<()> {
        let mut state = self.state.lock().unwrap();
        state.connect_calls += 1;
        if state.fail_connect {
            return Err(crate::NetError::Driver("injected connect failure".into()));
        }
        Ok(())
    }

    fn disconnect(&mut self) -> NetResult<()> {
        self.state.lock().unwrap().disconnect_calls += 1;
        Ok(())
    }

    fn rssi(&self) -> Option<i8> {
        self.state.lock().unwrap().rssi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_driver_records_calls() {
        let mut wifi = MemoryWifi::new();
        let handle = wifi.clone();
        wifi.configure("Lab", "secret").unwrap();
        wifi.connect().unwrap();
        wifi.disconnect().unwrap();
        assert_eq!(
            handle.configured(),
            Some(("Lab".to_string(), "secret".to_string()))
        );
        assert_eq!(handle.connect_calls(), 1);
        assert_eq!(handle.disconnect_calls(), 1);
    }

    #[test]
    fn injected_connect_failure() {
        let mut wifi = MemoryWifi::new();
        wifi.fail_connect(true);
        assert!(wifi.connect().is_err());
        wifi.fail_connect(false);
        assert!(wifi.connect().is_ok());
    }
}
