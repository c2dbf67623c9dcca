//! # Priority queue of pending petitions.
//!
//! [`PetitionQueue`] is safe for concurrent producers (client connections,
//! the watchdog, the shutdown path) and a single consumer (the processor
//! loop). Ordering is **total** and depends only on the pair
//! `(priority, arrival seq)`: lower priority value first, ties broken by
//! submission order. Concrete petition types never influence ordering, so
//! different implementations mix freely in one queue.
//!
//! ## Rules
//! - `wait_batch` blocks until at least one petition is available, then
//!   takes at most `max` items — and never more than were queued when the
//!   call started observing, so a burst of arrivals cannot extend a round.
//! - Re-inserting a petition keeps its original arrival seq: petitions
//!   skipped by the look-ahead return to their exact relative position.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::petitions::PetitionHandle;

/// Heap entry ordered by `(priority, seq)`, smallest first.
struct Entry(PetitionHandle);

impl Entry {
    #[inline]
    fn key(&self) -> (i64, u64) {
        (self.0.priority(), self.0.seq())
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Inverted so the std max-heap yields the smallest key first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

/// Concurrent-producer / single-consumer priority queue.
pub struct PetitionQueue {
    heap: Mutex<BinaryHeap<Entry>>,
    notify: Notify,
}

impl PetitionQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
        }
    }

    /// Inserts a petition and wakes the consumer.
    pub fn push(&self, handle: PetitionHandle) {
        self.heap
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Entry(handle));
        self.notify.notify_one();
    }

    /// Number of queued petitions.
    pub fn len(&self) -> usize {
        self.heap.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes up to `max` petitions in priority order, bounded by the queue
    /// length at the time of the call.
    pub fn pop_batch(&self, max: usize) -> Vec<PetitionHandle> {
        let mut heap = self.heap.lock().unwrap_or_else(|e| e.into_inner());
        let take = max.min(heap.len());
        let mut batch = Vec::with_capacity(take);
        for _ in 0..take {
            match heap.pop() {
                Some(entry) => batch.push(entry.0),
                None => break,
            }
        }
        batch
    }

    /// Waits until petitions are available (or `token` fires), then takes a
    /// batch. Returns an empty batch only on cancellation.
    pub async fn wait_batch(&self, max: usize, token: &CancellationToken) -> Vec<PetitionHandle> {
        loop {
            // register interest before checking, so a concurrent push
            // between the check and the await cannot be missed
            let notified = self.notify.notified();
            let batch = self.pop_batch(max);
            if !batch.is_empty() {
                return batch;
            }
            tokio::select! {
                _ = notified => {}
                _ = token.cancelled() => return Vec::new(),
            }
        }
    }

    /// Empties the queue, returning everything in priority order.
    pub fn drain(&self) -> Vec<PetitionHandle> {
        let mut heap = self.heap.lock().unwrap_or_else(|e| e.into_inner());
        let mut all = Vec::with_capacity(heap.len());
        while let Some(entry) = heap.pop() {
            all.push(entry.0);
        }
        all
    }
}

impl Default for PetitionQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::petitions::{FnPetition, PetitionHandle, ProcessPetition, Reply};

    fn handle(id: &str, priority: i64, seq: u64) -> PetitionHandle {
        PetitionHandle::new(FnPetition::builder(id, priority).arc(), seq, Reply::null())
    }

    #[test]
    fn test_pops_lowest_priority_value_first() {
        let q = PetitionQueue::new();
        q.push(handle("low", 30, 0));
        q.push(handle("high", 1, 1));
        q.push(handle("mid", 10, 2));

        let batch = q.pop_batch(3);
        let ids: Vec<String> = batch.iter().map(|h| h.id().to_string()).collect();
        assert_eq!(ids, ["high", "mid", "low"]);
    }

    #[test]
    fn test_equal_priority_preserves_arrival_order() {
        let q = PetitionQueue::new();
        q.push(handle("first", 5, 0));
        q.push(handle("second", 5, 1));
        q.push(handle("third", 5, 2));

        let ids: Vec<String> = q
            .pop_batch(3)
            .iter()
            .map(|h| h.id().to_string())
            .collect();
        assert_eq!(ids, ["first", "second", "third"]);
    }

    #[test]
    fn test_reinsertion_keeps_relative_order() {
        let q = PetitionQueue::new();
        q.push(handle("a", 5, 0));
        q.push(handle("b", 5, 1));

        // skip both, put them back, then add a newcomer of equal priority
        let skipped = q.pop_batch(2);
        for h in skipped {
            q.push(h);
        }
        q.push(handle("c", 5, 2));

        let ids: Vec<String> = q
            .pop_batch(3)
            .iter()
            .map(|h| h.id().to_string())
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_ordering_ignores_concrete_type() {
        // Different petition implementations with equal priority order
        // purely by arrival, proving no subtype field leaks into ordering.
        let q = PetitionQueue::new();
        let proc = PetitionHandle::new(
            ProcessPetition::new("proc", 7, "true", Vec::<String>::new()).arc(),
            0,
            Reply::null(),
        );
        let func = handle("func", 7, 1);
        q.push(func);
        q.push(proc);

        let ids: Vec<String> = q
            .pop_batch(2)
            .iter()
            .map(|h| h.id().to_string())
            .collect();
        assert_eq!(ids, ["proc", "func"]);
    }

    #[test]
    fn test_pop_batch_bounded_by_len() {
        let q = PetitionQueue::new();
        q.push(handle("only", 1, 0));
        let batch = q.pop_batch(10);
        assert_eq!(batch.len(), 1);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_wait_batch_returns_empty_on_cancel() {
        let q = PetitionQueue::new();
        let token = CancellationToken::new();
        token.cancel();
        let batch = q.wait_batch(1, &token).await;
        assert!(batch.is_empty());
    }
}
