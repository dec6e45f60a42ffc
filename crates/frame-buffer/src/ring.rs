//! Evict-oldest overwrite ring

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::trace;

/// Bounded FIFO ring that evicts the oldest item to make room for a new one.
///
/// Written by one thread and read (drained or snapshotted) by others, so all
/// access goes through a mutex. Evictions are counted for observability.
pub struct OverwriteRing<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
    total_written: AtomicU64,
    evicted: AtomicU64,
}

impl<T> OverwriteRing<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            total_written: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Push an item, evicting and returning the oldest one if the ring is
    /// at capacity.
    pub fn push(&self, item: T) -> Option<T> {
        let mut inner = self.lock();
        let evicted = if inner.len() >= self.capacity {
            inner.pop_front()
        } else {
            None
        };
        inner.push_back(item);
        drop(inner);

        self.total_written.fetch_add(1, Ordering::Relaxed);
        if evicted.is_some() {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            trace!(capacity = self.capacity, "ring full, oldest evicted");
        }
        evicted
    }

    /// Remove and return all buffered items, oldest first.
    pub fn drain_all(&self) -> Vec<T> {
        self.lock().drain(..).collect()
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

    /// Total items ever written
    pub fn total_written(&self) -> u64 {
        self.total_written.load(Ordering::Relaxed)
    }

    /// Items evicted by overflow
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Clone> OverwriteRing<T> {
    /// Copy the current contents, oldest first, without consuming them.
    /// The first element approximates the start of the retained history.
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().iter().cloned().collect()
    }
}
