//! Bounded admission of service tasks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fleetscan_core::CoreError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Admits at most `capacity` holders at a time.
///
/// Waiters are served in the order they called [`admit`](Self::admit): the underlying
/// semaphore queues them FIFO, so a freed slot always goes to the longest waiter.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// A held slot. Dropping it frees the slot for the next waiter.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Result<Self, CoreError> {
        if capacity == 0 {
            return Err(CoreError::InvalidConcurrency(capacity));
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            counters: Arc::new(Counters::default()),
        })
    }

    /// Wait for a free slot. Returns `None` once the gate is closed.
    pub async fn admit(&self) -> Option<Slot> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;
        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(now, Ordering::SeqCst);
        Some(Slot {
            _permit: permit,
            counters: self.counters.clone(),
        })
    }

    /// Stop admitting. Pending and future `admit` calls return `None`.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of slots held at once.
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }
}
