//! Dispatch queue and offline buffer
//!
//! Both containers hold [`ReportItem`]s and are owned by the dispatcher's
//! shared state. They never block and never touch the network.
//!
//! ## Ordering
//!
//! - New items are appended at the tail of the [`DispatchQueue`].
//! - A failed batch is put back at the head, keeping its relative order,
//!   so retried items go out before strictly newer ones.
//! - The [`OfflineBuffer`] is replayed at the head of the queue, oldest
//!   first, ahead of anything enqueued while offline.

use std::collections::VecDeque;

use lookout_core::domain::ReportItem;

// ============================================================================
// DispatchQueue
// ============================================================================

/// FIFO of pending items with head re-insertion for retries
#[derive(Debug, Default)]
pub struct DispatchQueue {
    items: VecDeque<ReportItem>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an item at the tail and returns the new length.
    pub fn push(&mut self, item: ReportItem) -> usize {
        self.items.push_back(item);
        self.items.len()
    }

    /// Removes up to `max` items from the head.
    pub fn take_front(&mut self, max: usize) -> Vec<ReportItem> {
        let n = max.min(self.items.len());
        self.items.drain(..n).collect()
    }

    /// Puts `items` back at the head, preserving their relative order.
    pub fn requeue_front(&mut self, items: Vec<ReportItem>) {
        for item in items.into_iter().rev() {
            self.items.push_front(item);
        }
    }

    /// Removes every item, oldest first.
    pub fn drain_all(&mut self) -> Vec<ReportItem> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ids of the queued items in dispatch order
    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.id().to_string()).collect()
    }
}

// ============================================================================
// OfflineBuffer
// ============================================================================

/// Items held back while the connectivity monitor reports offline
#[derive(Debug, Default)]
pub struct OfflineBuffer {
    items: Vec<ReportItem>,
}

impl OfflineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: ReportItem) {
        self.items.push(item);
    }

    /// Appends a whole batch, keeping its order.
    pub fn extend(&mut self, batch: Vec<ReportItem>) {
        self.items.extend(batch);
    }

    /// Empties the buffer and returns its items, oldest first.
    pub fn take_all(&mut self) -> Vec<ReportItem> {
        std::mem::take(&mut self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.id().to_string()).collect()
    }
}
