//! Cloud transport seam.

use crate::CloudResult;
use std::sync::{Arc, Mutex};

/// An inbound publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Events the MQTT client reports to the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudEvent {
    /// Mutual-TLS session established and subscriptions active.
    SessionUp,
    SessionDown,
    Message(CloudMessage),
}

/// The outbound half of the cloud session.
pub trait CloudLink: Send + Sync {
    fn publish(&self, topic: &str, payload: &[u8]) -> CloudResult<()>;
}

/// Recording link for tests.
#[derive(Default, Clone)]
pub struct MemoryCloud {
    published: Arc<Mutex<Vec<CloudMessage>>>,
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<CloudMessage> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<Vec<u8>> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload.clone())
            .collect()
    }
}

impl CloudLink for MemoryCloud {
    fn publish(&self, topic: &str, payload: &[u8]) -> CloudResult<()> {
        self.published.lock().unwrap().push(CloudMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}
