//! Device configuration.
//!
//! All values are device-provisioned: compile-time defaults (overridable
//! at build via environment), optionally refined by a JSON file written at
//! first boot. Only the log level can be changed from the runtime
//! environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use verdant_types::{PumpCycle, ScheduleConfig};

/// Default cloud endpoint (override at build with VERDANT_CLOUD_HOST).
pub const DEFAULT_CLOUD_HOST: &str = match option_env!("VERDANT_CLOUD_HOST") {
    Some(host) => host,
    None => "iot.verdant.garden",
};

/// Default device identity (override at build with VERDANT_DEVICE_ID).
pub const DEFAULT_DEVICE_ID: &str = match option_env!("VERDANT_DEVICE_ID") {
    Some(id) => id,
    None => "verdant-dev",
};

/// Default proof-of-possession secret for the commissioning channel
/// (override at build with VERDANT_POP; production devices carry a
/// per-unit label secret).
pub const DEFAULT_POP: &str = match option_env!("VERDANT_POP") {
    Some(pop) => pop,
    None => "verdant-dev-pop",
};

pub const DEFAULT_LOG_LEVEL: &str = "info";

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_cloud_host() -> String {
    DEFAULT_CLOUD_HOST.to_string()
}

fn default_device_id() -> String {
    DEFAULT_DEVICE_ID.to_string()
}

fn default_pop() -> String {
    DEFAULT_POP.to_string()
}

fn default_heartbeat_secs() -> u64 {
    60
}

fn default_ble_fallback_secs() -> u64 {
    30
}

fn default_wifi_stable_min() -> u64 {
    5
}

fn default_pwm_freq_hz() -> u32 {
    1000
}

fn default_light_pin() -> u32 {
    4
}

fn default_pump_pin() -> u32 {
    5
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("verdant-data")
}

/// Main daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Cloud endpoint host name.
    #[serde(default = "default_cloud_host")]
    pub cloud_host: String,
    /// Device identity name (thing name on the cloud side).
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// Proof-of-possession secret for the local channel.
    #[serde(default = "default_pop")]
    pub provisioning_pop: String,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Seconds after boot before the local channel opens without a link.
    #[serde(default = "default_ble_fallback_secs")]
    pub ble_fallback_secs: u64,
    /// Minutes of continuous link uptime that close the local channel.
    #[serde(default = "default_wifi_stable_min")]
    pub wifi_stable_min: u64,
    /// First-boot light schedule, materialized into the store.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// First-boot pump cycle, materialized into the store.
    #[serde(default = "PumpCycle::default")]
    pub pump: PumpCycle,
    #[serde(default = "default_pwm_freq_hz")]
    pub pwm_freq_hz: u32,
    #[serde(default = "default_light_pin")]
    pub light_pin: u32,
    #[serde(default = "default_pump_pin")]
    pub pump_pin: u32,
    /// Accept the deprecated `ota_url` cloud-job shape.
    #[serde(default)]
    pub legacy_job_compat: bool,
    /// Whether a dedicated time transport (SNTP) reports sync.
    #[serde(default)]
    pub has_time_transport: bool,
    /// Durable-store directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Trust-root blob location; absent on uncommissioned dev units.
    #[serde(default)]
    pub trust_root_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            cloud_host: default_cloud_host(),
            device_id: default_device_id(),
            provisioning_pop: default_pop(),
            heartbeat_secs: default_heartbeat_secs(),
            ble_fallback_secs: default_ble_fallback_secs(),
            wifi_stable_min: default_wifi_stable_min(),
            schedule: ScheduleConfig::default(),
            pump: PumpCycle::default(),
            pwm_freq_hz: default_pwm_freq_hz(),
            light_pin: default_light_pin(),
            pump_pin: default_pump_pin(),
            legacy_job_compat: false,
            has_time_transport: false,
            data_dir: default_data_dir(),
            trust_root_path: None,
        }
    }
}

impl Config {
    /// Load from a file when it exists, falling back to defaults, then
    /// apply the environment override for the log level.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        config.load_from_env();
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Ok(level) = std::env::var("VERDANT_LOG_LEVEL") {
            if !level.trim().is_empty() {
                self.log_level = level;
            }
        }
    }
}
