//! Reserved keys in the durable store.

/// Well-known keys. Kept in one place so the full persisted surface of the
/// device is visible at a glance.
pub struct StoreKeys;

impl StoreKeys {
    /// Wi-Fi credentials blob (JSON `{ssid, psk}`).
    pub const WIFI_CREDS: &'static str = "wifi_creds";
    /// Light schedule blob (JSON `ScheduleConfig`).
    pub const SCHEDULE_CFG: &'static str = "schedule_cfg";
    /// Pump duty-cycle blob (JSON `PumpCycle`).
    pub const PUMP_CFG: &'static str = "pump_cfg";
    /// Anti-rollback firmware version (u32 LE).
    pub const OTA_VERSION: &'static str = "ota_version";
    /// Highest accepted session counter (u32 LE).
    pub const BLE_PEER_COUNTER: &'static str = "ble_peer_counter";
    /// Sliding anti-replay window bitmap (u64 LE).
    pub const BLE_PEER_WINDOW: &'static str = "ble_peer_window";
    /// Schedule reconciliation checkpoint (u64 LE, unix seconds).
    pub const LAST_SEEN_UTC: &'static str = "last_seen_utc";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_KEY_LEN;

    #[test]
    fn all_keys_fit_the_length_budget() {
        let keys = [
            StoreKeys::WIFI_CREDS,
            StoreKeys::SCHEDULE_CFG,
            StoreKeys::PUMP_CFG,
            StoreKeys::OTA_VERSION,
            StoreKeys::BLE_PEER_COUNTER,
            StoreKeys::BLE_PEER_WINDOW,
            StoreKeys::LAST_SEEN_UTC,
        ];
        for key in keys {
            assert!(key.len() <= MAX_KEY_LEN, "key too long: {key}");
        }
    }

    #[test]
    fn keys_are_unique() {
        use std::collections::HashSet;
        let keys = [
            StoreKeys::WIFI_CREDS,
            StoreKeys::SCHEDULE_CFG,
            StoreKeys::PUMP_CFG,
            StoreKeys::OTA_VERSION,
            StoreKeys::BLE_PEER_COUNTER,
            StoreKeys::BLE_PEER_WINDOW,
            StoreKeys::LAST_SEEN_UTC,
        ];
        let set: HashSet<_> = keys.iter().collect();
        assert_eq!(set.len(), keys.len());
    }
}
