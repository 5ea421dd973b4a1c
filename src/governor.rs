//! Concurrency governor: bounds the number of in-flight renders.
//!
//! Backed by a fair `tokio::sync::Semaphore`: a released permit goes straight
//! to the oldest waiter, so a newcomer can never take a slot between a
//! release and the waiter's wake-up. Slots are RAII guards and are released
//! exactly once, on drop, including on error paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{Error, Result};

/// A held render slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct RenderSlot {
    _permit: OwnedSemaphorePermit,
}

impl RenderSlot {
    /// Release explicitly; equivalent to dropping the slot.
    pub fn release(self) {}
}

// Decrements the queue counter when a waiter leaves the queue, whether it
// got a slot or its future was dropped.
struct Queued<'a>(&'a AtomicUsize);

impl Drop for Queued<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ConcurrencyGovernor {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    max_queue_depth: Option<usize>,
    queued: AtomicUsize,
}

impl ConcurrencyGovernor {
    /// `max_concurrent` is clamped to at least one slot.
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            max_queue_depth: None,
            queued: AtomicUsize::new(0),
        }
    }

    /// Reject acquisitions once `depth` callers are already waiting.
    pub fn with_queue_limit(mut self, depth: Option<usize>) -> Self {
        self.max_queue_depth = depth;
        self
    }

    /// Take a slot, waiting in FIFO order if all slots are busy.
    pub async fn acquire(&self) -> Result<RenderSlot> {
        if let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
            return Ok(RenderSlot { _permit: permit });
        }

        let ahead = self.queued.fetch_add(1, Ordering::SeqCst);
        let queued = Queued(&self.queued);
        if let Some(limit) = self.max_queue_depth {
            if ahead >= limit {
                return Err(Error::ResourceExhausted { queued: ahead, limit });
            }
        }
        debug!(
            "All {} render slots busy; queued behind {} waiter(s)",
            self.max_concurrent, ahead
        );

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Other("concurrency governor closed".into()))?;
        drop(queued);
        Ok(RenderSlot { _permit: permit })
    }

    /// Slots currently held.
    pub fn active_count(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }

    /// Callers currently waiting for a slot.
    pub fn queued_count(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
