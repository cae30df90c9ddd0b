//! Priority-aware bounded command FIFO.
//!
//! Normal commands ride a bounded deque with drop-oldest overflow. Safety
//! commands occupy a dedicated urgent slot that is delivered before
//! anything queued and is never dropped or coalesced.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;
use tracing::warn;
use verdant_types::Command;

/// Queue depth used by the device build.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// The single intake path for actuator changes.
pub struct CommandQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
    safety_seq: AtomicU64,
}

#[derive(Default)]
struct Inner {
    urgent: Option<Command>,
    normal: VecDeque<Command>,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
            safety_seq: AtomicU64::new(0),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }

    /// Enqueue a command. Urgent commands are routed to the urgent slot;
    /// a full queue drops its oldest non-urgent entry.
    pub fn submit(&self, cmd: Command) {
        if cmd.is_urgent() {
            self.submit_urgent(cmd);
            return;
        }
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.normal.len() >= self.capacity {
                if let Some(pos) = inner.normal.iter().position(|c| !c.is_urgent()) {
                    let dropped = inner.normal.remove(pos);
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(?dropped, "Command queue full, dropped oldest entry");
                }
            }
            inner.normal.push_back(cmd);
        }
        self.notify.notify_one();
    }

    /// Enqueue an urgent command. Never drops; a second urgent arriving
    /// while the slot is occupied keeps FIFO order among urgents by
    /// pushing the newcomer to the queue head.
    pub fn submit_urgent(&self, cmd: Command) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.urgent.is_some() {
                inner.normal.push_front(cmd);
            } else {
                inner.urgent = Some(cmd);
            }
        }
        self.notify.notify_one();
    }

    /// Take the next command without waiting.
    pub fn try_recv(&self) -> Option<Command> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(urgent) = inner.urgent.take() {
            return Some(urgent);
        }
        inner.normal.pop_front()
    }

    /// Wait for the next command. The only unbounded wait in the device;
    /// the consumer also watches the shutdown bit.
    pub async fn recv(&self) -> Command {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        loop {
            notified.as_mut().enable();
            if let Some(cmd) = self.try_recv() {
                return cmd;
            }
            notified.as_mut().await;
            notified.set(self.notify.notified());
        }
    }

    /// Queued commands, urgent slot included.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.normal.len() + usize::from(inner.urgent.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-urgent commands discarded to overflow so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn next_safety_seq(&self) -> u64 {
        self.safety_seq.fetch_add(1, Ordering::Relaxed)
    }
}

/// Preempt entrypoint: force both actuators to zero ahead of anything
/// queued. Callable from any task, including the watchdog.
pub fn safety_shutdown(queue: &CommandQueue, timestamp: i64) {
    let seq = queue.next_safety_seq();
    queue.submit_urgent(Command::safety_stop(seq, timestamp));
}
