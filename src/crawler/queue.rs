//! Bounded hand-off queue between stages
//!
//! Each queue has exactly one consuming stage. Producers either respect the
//! ceiling (`try_push`, used when one stage forwards results to the next) or
//! bypass it (`push`, used by the frontier, which is capped by its own URL
//! budget instead).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

pub struct StageQueue<T> {
    items: Mutex<VecDeque<T>>,
    ceiling: usize,
    peak_len: AtomicUsize,
    pushes: AtomicU64,
    item_ready: Notify,
    space_freed: Notify,
}

impl<T> StageQueue<T> {
    /// Creates a queue that `try_push` will not fill past `ceiling` items
    pub fn with_ceiling(ceiling: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            ceiling,
            peak_len: AtomicUsize::new(0),
            pushes: AtomicU64::new(0),
            item_ready: Notify::new(),
            space_freed: Notify::new(),
        }
    }

    /// Creates a queue with no ceiling
    pub fn unbounded() -> Self {
        Self::with_ceiling(usize::MAX)
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Appends `item` only if the queue is below its ceiling
    ///
    /// Hands the item back when the queue is full so the caller can hold it.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let mut items = self.lock();
        if items.len() >= self.ceiling {
            return Err(item);
        }
        items.push_back(item);
        self.record_push(items.len());
        drop(items);
        self.item_ready.notify_one();
        Ok(())
    }

    /// Appends `item` regardless of the ceiling
    pub fn push(&self, item: T) {
        let mut items = self.lock();
        items.push_back(item);
        self.record_push(items.len());
        drop(items);
        self.item_ready.notify_one();
    }

    pub fn pop(&self) -> Option<T> {
        let item = self.lock().pop_front();
        if item.is_some() {
            self.space_freed.notify_one();
        }
        item
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest length the queue has ever reached
    pub fn peak_len(&self) -> usize {
        self.peak_len.load(Ordering::Relaxed)
    }

    /// Number of items ever pushed
    pub fn total_pushed(&self) -> u64 {
        self.pushes.load(Ordering::Relaxed)
    }

    /// Resolves once an item has been pushed since the last wake-up
    pub async fn item_ready(&self) {
        self.item_ready.notified().await
    }

    /// Resolves once an item has been popped since the last wake-up
    pub async fn space_freed(&self) {
        self.space_freed.notified().await
    }

    fn record_push(&self, len: usize) {
        self.pushes.fetch_add(1, Ordering::Relaxed);
        self.peak_len.fetch_max(len, Ordering::Relaxed);
    }

    // A poisoned queue still holds valid items; keep using it.
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
