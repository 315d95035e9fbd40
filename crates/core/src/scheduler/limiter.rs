//! Bound on the number of task runs executing at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// The limiter was closed and admits no more runs.
#[derive(Debug, Clone, Copy, Error)]
#[error("concurrency limiter is closed")]
pub struct LimiterClosed;

/// Snapshot of limiter usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterStatus {
    pub max_concurrent: usize,
    /// Runs currently holding a slot.
    pub active: usize,
    /// Runs waiting for a slot.
    pub queued: usize,
    /// Slots handed out since startup.
    pub total_admitted: u64,
    /// Highest `active` observed since startup.
    pub peak_active: usize,
}

#[derive(Default)]
struct SlotStats {
    active: AtomicU64,
    queued: AtomicU64,
    total_admitted: AtomicU64,
    peak_active: AtomicU64,
}

/// Counting semaphore with usage statistics.
///
/// Waiters are admitted in FIFO order.
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    stats: Arc<SlotStats>,
}

/// A held slot. Dropping it releases the slot, including on panic or cancellation.
pub struct SlotGuard {
    _permit: OwnedSemaphorePermit,
    stats: Arc<SlotStats>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Removes a waiter from the queue count even if the acquire future is dropped.
struct QueuedGuard(Arc<SlotStats>);

impl Drop for QueuedGuard {
    fn drop(&mut self) {
        self.0.queued.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            stats: Arc::new(SlotStats::default()),
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<SlotGuard, LimiterClosed> {
        self.stats.queued.fetch_add(1, Ordering::SeqCst);
        let queued = QueuedGuard(self.stats.clone());

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| LimiterClosed)?;
        drop(queued);

        let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_active.fetch_max(active, Ordering::SeqCst);
        self.stats.total_admitted.fetch_add(1, Ordering::Relaxed);

        Ok(SlotGuard {
            _permit: permit,
            stats: self.stats.clone(),
        })
    }

    /// Stop admitting runs. Pending and future `acquire` calls fail.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn status(&self) -> LimiterStatus {
        LimiterStatus {
            max_concurrent: self.max_concurrent,
            active: self.stats.active.load(Ordering::SeqCst) as usize,
            queued: self.stats.queued.load(Ordering::SeqCst) as usize,
            total_admitted: self.stats.total_admitted.load(Ordering::Relaxed),
            peak_active: self.stats.peak_active.load(Ordering::SeqCst) as usize,
        }
    }
}
