//! Pending queue and retry schedule.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use tokio::time::Instant;

use super::record::QueueItem;

/// Items waiting for a dispatch slot, highest priority first.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    items: VecDeque<QueueItem>,
}

impl PendingQueue {
    /// Insert before the first item with strictly lower priority, so equal
    /// priorities keep arrival order.
    pub fn push(&mut self, item: QueueItem) {
        let at = self
            .items
            .iter()
            .position(|queued| queued.priority < item.priority)
            .unwrap_or(self.items.len());
        self.items.insert(at, item);
    }

    pub fn pop_front(&mut self) -> Option<QueueItem> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = QueueItem> + '_ {
        self.items.drain(..)
    }
}

/// Retry entry. Ordered so that `BinaryHeap` pops the earliest due first, with
/// `seq` breaking ties in scheduling order.
struct ScheduledRetry {
    due: Instant,
    seq: u64,
    item: QueueItem,
}

impl PartialEq for ScheduledRetry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for ScheduledRetry {}

impl PartialOrd for ScheduledRetry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledRetry {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed: min-heap
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Items waiting out a backoff delay. They hold no concurrency slot.
#[derive(Default)]
pub(crate) struct ScheduledRetries {
    heap: BinaryHeap<ScheduledRetry>,
    next_seq: u64,
}

impl ScheduledRetries {
    pub fn schedule(&mut self, due: Instant, item: QueueItem) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ScheduledRetry { due, seq, item });
    }

    /// Pop the earliest entry if it is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<QueueItem> {
        if self.heap.peek()?.due > now {
            return None;
        }
        self.heap.pop().map(|entry| entry.item)
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.due)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = QueueItem> + '_ {
        self.heap.drain().map(|entry| entry.item)
    }
}

impl std::fmt::Debug for ScheduledRetries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledRetries")
            .field("len", &self.heap.len())
            .field("next_due", &self.next_due())
            .finish()
    }
}
