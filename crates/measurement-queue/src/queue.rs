//! Drop-Oldest MPSC Ring Implementation

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Queue construction errors
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// Capacity of zero cannot hold any item
    #[error("queue capacity must be non-zero")]
    ZeroCapacity,
}

/// Ring state guarded by the queue mutex
struct QueueState<T> {
    /// Item slots; a vacated slot holds `None`
    slots: Vec<Option<T>>,
    /// Read cursor (oldest item)
    read: usize,
    /// Write cursor (next slot to fill)
    write: usize,
    /// Number of queued items
    size: usize,
    /// Terminal flag; refuses producers, releases consumers
    shutdown: bool,
}

impl<T> QueueState<T> {
    fn advance_read(&mut self) {
        self.read = if self.read + 1 == self.slots.len() {
            0
        } else {
            self.read + 1
        };
    }

    fn advance_write(&mut self) {
        self.write = if self.write + 1 == self.slots.len() {
            0
        } else {
            self.write + 1
        };
    }

    /// Move the oldest item out of its slot.
    fn take_oldest(&mut self) -> T {
        let item = self.slots[self.read]
            .take()
            .expect("occupied slot below read cursor");
        self.advance_read();
        self.size -= 1;
        item
    }
}

/// Bounded MPSC channel with drop-oldest overflow.
///
/// Shared by many producers and one or more consumers; all callers go
/// through `&self`, so it is typically held in an `Arc`.
pub struct GlobalQueue<T> {
    state: Mutex<QueueState<T>>,
    /// Signals non-empty-or-shutdown
    available: Condvar,
    capacity: usize,
}

impl<T> GlobalQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        let slots = (0..capacity).map(|_| None).collect();
        Ok(Self {
            state: Mutex::new(QueueState {
                slots,
                read: 0,
                write: 0,
                size: 0,
                shutdown: false,
            }),
            available: Condvar::new(),
            capacity,
        })
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        // Recover a poisoned lock; drop-oldest delivery tolerates a
        // lost update.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue an item, displacing the oldest pending one if full.
    ///
    /// Never blocks beyond the internal critical section. Returns `false`
    /// only after `shutdown`, in which case the item is dropped.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.lock();
        if state.shutdown {
            return false;
        }

        let write = state.write;
        state.slots[write] = Some(item);
        if state.size == self.capacity {
            // Full ring: the write just overwrote the oldest item.
            state.advance_read();
        } else {
            state.size += 1;
        }
        state.advance_write();

        drop(state);
        self.available.notify_one();
        true
    }

    /// Block until an item is available or the queue shuts down.
    ///
    /// Returns `None` iff the queue is shut down and drained.
    pub fn pop(&self) -> Option<T> {
        let state = self.lock();
        let mut state = self
            .available
            .wait_while(state, |s| !s.shutdown && s.size == 0)
            .unwrap_or_else(PoisonError::into_inner);

        if state.size == 0 {
            return None;
        }
        Some(state.take_oldest())
    }

    /// Non-blocking pop; `None` when empty, shut down or not.
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.lock();
        if state.size == 0 {
            return None;
        }
        Some(state.take_oldest())
    }

    /// Refuse further pushes and release every blocked consumer.
    ///
    /// Idempotent. Items already queued stay drainable via `try_pop`.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        drop(state);
        self.available.notify_all();
    }

    /// Maximum number of queued items
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items currently queued
    pub fn len(&self) -> usize {
        self.lock().size
    }

    /// Check if no items are queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check whether `shutdown` has been called
    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(matches!(
            GlobalQueue::<u32>::new(0),
            Err(QueueError::ZeroCapacity)
        ));
    }

    #[test]
    fn test_fifo_order() {
        let q = GlobalQueue::new(8).unwrap();
        for i in 0..5 {
            assert!(q.push(i));
        }
        for i in 0..5 {
            assert_eq!(q.pop(), Some(i));
        }
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn test_drop_oldest_keeps_newest_items() {
        let q = GlobalQueue::new(2).unwrap();
        for item in ["A", "B", "C", "D"] {
            assert!(q.push(item));
        }

        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(), Some("C"));
        assert_eq!(q.pop(), Some("D"));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn test_overfill_yields_last_capacity_items_in_order() {
        let q = GlobalQueue::new(4).unwrap();
        for i in 0..10 {
            assert!(q.push(i));
        }
        for i in 6..10 {
            assert_eq!(q.try_pop(), Some(i));
        }
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn test_push_after_shutdown_is_refused() {
        let q = GlobalQueue::new(2).unwrap();
        assert!(q.push(1));
        q.shutdown();
        assert!(!q.push(2));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_drain_after_shutdown() {
        let q = GlobalQueue::new(4).unwrap();
        q.push(1);
        q.push(2);
        q.shutdown();
        q.shutdown(); // idempotent

        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), None);
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_shutdown_unblocks_pending_pop() {
        let q = Arc::new(GlobalQueue::<u32>::new(2).unwrap());
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.pop())
        };

        thread::sleep(Duration::from_millis(50));
        q.shutdown();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_pop_wakes_for_late_push() {
        let q = Arc::new(GlobalQueue::<u32>::new(2).unwrap());
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.pop())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(q.push(42));
        assert_eq!(consumer.join().unwrap(), Some(42));
    }

    #[test]
    fn test_mpsc_delivery_preserves_per_producer_order() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 100;

        let q = Arc::new(GlobalQueue::new((PRODUCERS * PER_PRODUCER) as usize).unwrap());
        let mut handles = Vec::new();
        for p in 0..PRODUCERS {
            let q = Arc::clone(&q);
            handles.push(thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    assert!(q.push((p, i)));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        q.shutdown();

        let mut next = [0u64; PRODUCERS as usize];
        while let Some((p, i)) = q.pop() {
            assert_eq!(i, next[p as usize]);
            next[p as usize] += 1;
        }
        assert_eq!(next, [PER_PRODUCER; PRODUCERS as usize]);
    }
}
