//! Device shadow reporting.

use serde::Serialize;
use verdant_types::{ScheduleConfig, UpdateStatus};

/// Long-lived state mirrored into the cloud shadow's `reported` block.
#[derive(Debug, Clone, Serialize)]
pub struct ReportedState {
    pub fw_version: u32,
    pub last_update_status: UpdateStatus,
    /// Unix seconds of the last accepted provisioning frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commissioning_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleConfig>,
    pub light_percent: u8,
    pub pump_percent: u8,
}

/// Wrap reported state in the shadow-update envelope.
pub fn shadow_document(state: &ReportedState) -> serde_json::Value {
    serde_json::json!({ "state": { "reported": state } })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ReportedState {
        ReportedState {
            fw_version: 4,
            last_update_status: UpdateStatus::Succeeded,
            last_commissioning_time: Some(1_700_000_000),
            schedule: Some(ScheduleConfig::default()),
            light_percent: 100,
            pump_percent: 0,
        }
    }

    #[test]
    fn document_has_shadow_envelope() {
        let doc = shadow_document(&state());
        assert_eq!(doc["state"]["reported"]["fw_version"], 4);
        assert_eq!(doc["state"]["reported"]["last_update_status"], "succeeded");
        assert_eq!(doc["state"]["reported"]["light_percent"], 100);
    }

    #[test]
    fn optional_fields_omitted() {
        let mut s = state();
        s.last_commissioning_time = None;
        s.schedule = None;
        let doc = shadow_document(&s);
        assert!(doc["state"]["reported"]
            .get("last_commissioning_time")
            .is_none());
        assert!(doc["state"]["reported"].get("schedule").is_none());
    }

    #[test]
    fn reverted_status_is_reportable() {
        let mut s = state();
        s.last_update_status = UpdateStatus::Reverted;
        let doc = shadow_document(&s);
        assert_eq!(doc["state"]["reported"]["last_update_status"], "reverted");
    }
}
