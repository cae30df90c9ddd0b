//! Topic layout.

/// The jobs subscription filter for this device.
pub fn jobs_notify_subscription(device_id: &str) -> String {
    format!("$aws/things/{device_id}/jobs/+/notify-next")
}

/// Whether an inbound topic is a jobs notify-next for this device.
pub fn matches_jobs_notify(topic: &str, device_id: &str) -> bool {
    let prefix = format!("$aws/things/{device_id}/jobs/");
    match topic.strip_prefix(&prefix) {
        Some(rest) => match rest.strip_suffix("/notify-next") {
            Some(job_id) => !job_id.is_empty() && !job_id.contains('/'),
            None => false,
        },
        None => false,
    }
}

/// Shadow update publication topic.
pub fn shadow_update_topic(device_id: &str) -> String {
    format!("$aws/things/{device_id}/shadow/update")
}

/// Default heartbeat topic.
pub fn heartbeat_topic(device_id: &str) -> String {
    format!("verdant/{device_id}/heartbeat")
}

/// Default audit topic.
pub fn audit_topic(device_id: &str) -> String {
    format!("verdant/{device_id}/audit")
}
