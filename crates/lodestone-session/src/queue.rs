//! The expiration queue between the cache's eviction listener and the
//! expiration worker.
//!
//! The eviction listener is synchronous and may run inside a request task
//! or the sweeper task; it must not block and cannot await. So the queue's
//! producer side is an unbounded `mpsc` sender (pushing is a lock-free,
//! non-blocking call) and all of the slow work happens on the consumer
//! side, in the worker.
//!
//! The receiver sits behind a `tokio::sync::Mutex`. Holding that lock *is*
//! the worker's single-slot drain lock: at most one drain cycle can be
//! dequeuing and cleaning up at a time.

use std::sync::atomic::{AtomicUsize, Ordering};

use lodestone_cache::EvictionReason;
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio::time::Instant;

use crate::{AccountId, UserId};

/// One pending cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationQueueItem {
    /// Whose session expired.
    pub user_id: UserId,
    /// The account the expired session was logged into.
    pub account_id: AccountId,
    /// Why the cache evicted the entry. Only `Expired` is enqueued today.
    pub reason: EvictionReason,
    /// When the eviction was observed.
    pub expired_at: Instant,
    /// How many cleanup attempts have failed transiently.
    pub retry_count: u32,
    /// Earliest instant the next attempt may run (retry backoff).
    pub not_before: Instant,
}

impl ExpirationQueueItem {
    /// A fresh item, eligible for cleanup immediately.
    pub fn new(user_id: UserId, account_id: AccountId, reason: EvictionReason) -> Self {
        let now = Instant::now();
        Self {
            user_id,
            account_id,
            reason,
            expired_at: now,
            retry_count: 0,
            not_before: now,
        }
    }
}

/// Process-wide queue of expired sessions awaiting cleanup.
///
/// Created once and shared through an `Arc` by the session cache's
/// eviction listener (producer) and the [`ExpirationWorker`](crate::ExpirationWorker)
/// (consumer).
pub struct ExpirationQueue {
    tx: mpsc::UnboundedSender<ExpirationQueueItem>,
    rx: Mutex<mpsc::UnboundedReceiver<ExpirationQueueItem>>,
    /// Items pushed but not yet taken. Readable without the drain lock.
    pending: AtomicUsize,
}

impl ExpirationQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            pending: AtomicUsize::new(0),
        }
    }

    /// Enqueues an item. Never blocks; safe from synchronous callbacks.
    pub fn push(&self, item: ExpirationQueueItem) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        // The receiver lives in `self`, so the channel cannot be closed
        // while we can still be called.
        if let Err(e) = self.tx.send(item) {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            tracing::error!(user_id = %e.0.user_id, "expiration queue closed, item lost");
        }
    }

    /// Number of items waiting to be drained.
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Returns `true` if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Acquires the drain lock, waiting for any in-flight drain cycle.
    pub(crate) async fn lock(&self) -> QueueDrain<'_> {
        QueueDrain {
            rx: self.rx.lock().await,
            pending: &self.pending,
        }
    }
}

impl Default for ExpirationQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to the consumer side for one drain cycle.
pub(crate) struct QueueDrain<'a> {
    rx: MutexGuard<'a, mpsc::UnboundedReceiver<ExpirationQueueItem>>,
    pending: &'a AtomicUsize,
}

impl QueueDrain<'_> {
    /// Dequeues up to `max` items without waiting.
    pub(crate) fn take(&mut self, max: usize) -> Vec<ExpirationQueueItem> {
        let mut batch = Vec::with_capacity(max.min(self.pending.load(Ordering::SeqCst)));
        while batch.len() < max {
            match self.rx.try_recv() {
                Ok(item) => {
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                    batch.push(item);
                }
                Err(_) => break,
            }
        }
        batch
    }
}
