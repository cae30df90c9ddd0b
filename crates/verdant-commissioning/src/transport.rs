//! Short-range radio seam.

use crate::CommResult;
use std::sync::{Arc, Mutex};

/// Longest frame the channel accepts in either direction.
pub const MAX_FRAME_LEN: usize = 256;

/// Length of the device identifier carried in the scan response.
pub const DEVICE_ID_LEN: usize = 6;

/// Short advertised name: fixed prefix plus the identifier's last three
/// bytes in hex.
pub fn short_name(device_id: &[u8; DEVICE_ID_LEN]) -> String {
    format!(
        "VERDANT-{}",
        hex::encode_upper(&device_id[DEVICE_ID_LEN - 3..])
    )
}

/// The radio service as the session server sees it.
///
/// Inbound frames arrive over the channel handed to the server; the trait
/// carries advertising control and the response path.
pub trait BeaconTransport: Send {
    fn start_advertising(
        &mut self,
        short_name: &str,
        device_id: &[u8; DEVICE_ID_LEN],
    ) -> CommResult<()>;
    fn stop_advertising(&mut self) -> CommResult<()>;
    /// Send a response frame to the connected peer.
    fn respond(&mut self, frame: &[u8]) -> CommResult<()>;
}

/// Recording transport for tests.
#[derive(Default, Clone)]
pub struct MemoryBeacon {
    state: Arc<Mutex<MemoryBeaconState>>,
}

#[derive(Default)]
struct MemoryBeaconState {
    advertising: Option<String>,
    responses: Vec<Vec<u8>>,
}

impl MemoryBeacon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently advertised short name, if any.
    pub fn advertising(&self) -> Option<String> {
        self.state.lock().unwrap().advertising.clone()
    }

    pub fn responses(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().responses.clone()
    }

    pub fn last_response(&self) -> Option<Vec<u8>> {
        self.state.lock().unwrap().responses.last().cloned()
    }
}

impl BeaconTransport for MemoryBeacon {
    fn start_advertising(
        &mut self,
        short_name: &str,
        _device_id: &[u8; DEVICE_ID_LEN],
    ) -> CommResult<()> {
        self.state.lock().unwrap().advertising = Some(short_name.to_string());
        Ok(())
    }

    fn stop_advertising(&mut self) -> CommResult<()> {
        self.state.lock().unwrap().advertising = None;
        Ok(())
    }

    fn respond(&mut self, frame: &[u8]) -> CommResult<()> {
        self.state.lock().unwrap().responses.push(frame.to_vec());
        Ok(())
    }
}
