//! Queues and channels used between the feed, the engine and the executor

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

use super::types::{Snapshot, TradeEvent, Trigger};

/// Default snapshot queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default channel buffer size for trade events
pub const DEFAULT_CHANNEL_SIZE: usize = 256;

/// Bounded FIFO of pending snapshots with last-value-wins overflow
///
/// `push` never blocks. When the queue is full the oldest pending snapshot
/// for the same symbol is discarded, or the oldest snapshot overall when the
/// symbol has nothing pending. Order within one symbol is preserved.
#[derive(Debug)]
pub struct SnapshotQueue {
    pending: Mutex<VecDeque<Snapshot>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
}

impl SnapshotQueue {
    /// Create a queue holding at most `capacity` snapshots (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a snapshot, returning whatever had to be evicted to make room
    pub fn push(&self, snapshot: Snapshot) -> Option<Snapshot> {
        let evicted = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            let evicted = if pending.len() >= self.capacity {
                let idx = pending
                    .iter()
                    .position(|s| s.symbol == snapshot.symbol)
                    .unwrap_or(0);
                pending.remove(idx)
            } else {
                None
            };
            pending.push_back(snapshot);
            evicted
        };

        if evicted.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        evicted
    }

    /// Take the oldest pending snapshot
    pub fn pop(&self) -> Option<Snapshot> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    /// Wait until something is pushed or `timeout` elapses
    pub async fn wait(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }

    /// Wake a waiter without pushing anything
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshots evicted because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for SnapshotQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Create the trigger hand-off channel
///
/// Unbounded: the engine side must never block, and triggers are rare since
/// each satisfaction episode fires at most once.
pub fn create_trigger_channel() -> (mpsc::UnboundedSender<Trigger>, mpsc::UnboundedReceiver<Trigger>) {
    mpsc::unbounded_channel()
}

/// Create a trade event channel with the default buffer size
pub fn create_trade_event_channel() -> (mpsc::Sender<TradeEvent>, mpsc::Receiver<TradeEvent>) {
    mpsc::channel(DEFAULT_CHANNEL_SIZE)
}

/// Create a trade event channel with a custom buffer size
pub fn create_trade_event_channel_with_size(
    size: usize,
) -> (mpsc::Sender<TradeEvent>, mpsc::Receiver<TradeEvent>) {
    mpsc::channel(size)
}
