//! Reject-newest bounded queue

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::trace;

/// Bounded FIFO queue with a non-blocking `offer` that rejects new items
/// when the queue is full.
///
/// Accepted items preserve submission order. Rejections are counted, not
/// surfaced as errors.
pub struct BoundedQueue<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Offer an item without blocking. Returns `false` (and drops the item)
    /// when the queue is at capacity.
    pub fn offer(&self, item: T) -> bool {
        let mut inner = self.lock();
        if inner.len() >= self.capacity {
            drop(inner);
            self.rejected.fetch_add(1, Ordering::Relaxed);
            trace!(capacity = self.capacity, "queue full, item rejected");
            return false;
        }
        inner.push_back(item);
        self.accepted.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Remove and return up to `max` items, oldest first. Never blocks; an
    /// empty queue yields an empty vec.
    pub fn drain(&self, max: usize) -> Vec<T> {
        let mut inner = self.lock();
        let take = max.min(inner.len());
        inner.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items accepted since creation
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Items rejected since creation
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    // Queue operations are infallible; a poisoned lock just means a panicking
    // thread died mid-push, and the queue contents remain structurally sound.
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
