//! Process-wide link-state event group.
//!
//! A lock-free bit-vector with async waiters. Each bit has exactly one
//! owning component that sets and clears it; everyone else only reads or
//! waits. Modeled after a hardware event group: `set`/`clear` never block,
//! waiting is explicit.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// The station interface has an IP-level link. Owned by the network
/// supervisor.
pub const WIFI_UP: u32 = 1 << 0;
/// Wall-clock time is trustworthy. Owned by the network supervisor.
pub const TIME_SYNCED: u32 = 1 << 1;
/// The cloud session is established. Owned by the cloud router.
pub const CLOUD_SESSION_UP: u32 = 1 << 2;
/// The local commissioning channel should be advertising. Owned by the
/// commissioning arbiter.
pub const LOCAL_CHANNEL_ACTIVE: u32 = 1 << 3;
/// Orderly shutdown requested; every task loop exits at its next
/// suspension point.
pub const SHUTDOWN: u32 = 1 << 4;

/// Shared event-bit group.
#[derive(Debug, Default)]
pub struct LinkBits {
    bits: AtomicU32,
    notify: Notify,
}

impl LinkBits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set all bits in `mask` and wake waiters.
    pub fn set(&self, mask: u32) {
        self.bits.fetch_or(mask, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Clear all bits in `mask` and wake waiters.
    pub fn clear(&self, mask: u32) {
        self.bits.fetch_and(!mask, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether every bit in `mask` is currently set.
    pub fn contains(&self, mask: u32) -> bool {
        self.bits.load(Ordering::SeqCst) & mask == mask
    }

    /// Current raw bit pattern.
    pub fn snapshot(&self) -> u32 {
        self.bits.load(Ordering::SeqCst)
    }

    /// Request orderly shutdown.
    pub fn trigger_shutdown(&self) {
        self.set(SHUTDOWN);
    }

    pub fn is_shutdown(&self) -> bool {
        self.contains(SHUTDOWN)
    }

    /// Wait until every bit in `mask` is set.
    pub async fn wait_for(&self, mask: u32) {
        self.wait_until(|bits| bits & mask == mask).await
    }

    /// Wait until every bit in `mask` is clear.
    pub async fn wait_for_clear(&self, mask: u32) {
        self.wait_until(|bits| bits & mask == 0).await
    }

    /// Wait until every bit in `mask` is set, or until `timeout` elapses.
    /// Returns whether the condition was met.
    pub async fn wait_for_timeout(&self, mask: u32, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_for(mask))
            .await
            .is_ok()
    }

    async fn wait_until(&self, cond: impl Fn(u32) -> bool) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        loop {
            // Register interest before the check so a concurrent set/clear
            // between check and await cannot be missed.
            notified.as_mut().enable();
            if cond(self.bits.load(Ordering::SeqCst)) {
                return;
            }
            notified.as_mut().await;
            notified.set(self.notify.notified());
        }
    }
}
