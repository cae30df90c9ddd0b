//! Application-slot seam.

use crate::{OtaError, OtaResult};
use std::sync::{Arc, Mutex};

/// Lifecycle of the alternate application slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Writing,
    Written,
    /// Marked for the boot loader to try on the next reset.
    PendingBoot,
    /// Confirmed by the new image's first boot; rollback cancelled.
    Confirmed,
    /// Aborted or failed verification; contents discarded.
    Invalidated,
}

/// Flash slot operations the pipeline drives.
pub trait SlotBackend: Send {
    fn begin(&mut self) -> OtaResult<()>;
    fn write(&mut self, chunk: &[u8]) -> OtaResult<()>;
    /// Discard the slot contents after a failed download or verification.
    fn abort(&mut self);
    /// Mark the slot for a trial boot.
    fn mark_pending(&mut self) -> OtaResult<()>;
    /// First-boot confirmation; cancels automatic rollback.
    fn confirm(&mut self) -> OtaResult<()>;
    /// Boot-loader fallback to the previous slot.
    fn revert(&mut self) -> OtaResult<()>;
    fn state(&self) -> SlotState;
}

/// In-memory slot for tests.
#[derive(Default, Clone)]
pub struct MemorySlot {
    inner: Arc<Mutex<MemorySlotState>>,
}

struct MemorySlotState {
    state: SlotState,
    bytes: Vec<u8>,
    fail_write_after: Option<usize>,
}

impl Default for MemorySlotState {
    fn default() -> Self {
        Self {
            state: SlotState::Empty,
            bytes: Vec::new(),
            fail_write_after: None,
        }
    }
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.inner.lock().unwrap().bytes.clone()
    }

    /// Fail writes once the slot holds at least `len` bytes.
    pub fn fail_write_after(&self, len: usize) {
        self.inner.lock().unwrap().fail_write_after = Some(len);
    }
}

impl SlotBackend for MemorySlot {
    fn begin(&mut self) -> OtaResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.bytes.clear();
        inner.state = SlotState::Writing;
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> OtaResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != SlotState::Writing {
            return Err(OtaError::Slot(format!(
                "write outside Writing state: {:?}",
                inner.state
            )));
        }
        if let Some(limit) = inner.fail_write_after {
            if inner.bytes.len() >= limit {
                return Err(OtaError::Slot("injected write failure".into()));
            }
        }
        inner.bytes.extend_from_slice(chunk);
        Ok(())
    }

    fn abort(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        inner.bytes.clear();
        inner.state = SlotState::Invalidated;
    }

    fn mark_pending(&mut self) -> OtaResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != SlotState::Writing {
            return Err(OtaError::Slot("mark_pending on a non-written slot".into()));
        }
        inner.state = SlotState::PendingBoot;
        Ok(())
    }

    fn confirm(&mut self) -> OtaResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != SlotState::PendingBoot {
            return Err(OtaError::Slot("confirm without a pending slot".into()));
        }
        inner.state = SlotState::Confirmed;
        Ok(())
    }

    fn revert(&mut self) -> OtaResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.state = SlotState::Invalidated;
        inner.bytes.clear();
        Ok(())
    }

    fn state(&self) -> SlotState {
        self.inner.lock().unwrap().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_lifecycle() {
        let mut slot = MemorySlot::new();
        assert_eq!(slot.state(), SlotState::Empty);
        slot.begin().unwrap();
        slot.write(b"image ").unwrap();
        slot.write(b"bytes").unwrap();
        slot.mark_pending().unwrap();
        assert_eq!(slot.state(), SlotState::PendingBoot);
        slot.confirm().unwrap();
        assert_eq!(slot.state(), SlotState::Confirmed);
        assert_eq!(slot.bytes(), b"image bytes");
    }

    #[test]
    fn abort_invalidates_and_discards() {
        let mut slot = MemorySlot::new();
        slot.begin().unwrap();
        slot.write(b"partial").unwrap();
        slot.abort();
        assert_eq!(slot.state(), SlotState::Invalidated);
        assert!(slot.bytes().is_empty());
    }

    #[test]
    fn write_requires_begin() {
        let mut slot = MemorySlot::new();
        assert!(slot.write(b"x").is_err());
    }

    #[test]
    fn confirm_requires_pending() {
        let mut slot = MemorySlot::new();
        slot.begin().unwrap();
        assert!(slot.confirm().is_err());
    }

    #[test]
    fn begin_resets_previous_contents() {
        let mut slot = MemorySlot::new();
        slot.begin().unwrap();
        slot.write(b"old").unwrap();
        slot.begin().unwrap();
        assert!(slot.bytes().is_empty());
    }

    #[test]
    fn injected_write_failure() {
        let mut slot = MemorySlot::new();
        slot.fail_write_after(4);
        slot.begin().unwrap();
        slot.write(b"1234").unwrap();
        assert!(slot.write(b"5").is_err());
    }
}
