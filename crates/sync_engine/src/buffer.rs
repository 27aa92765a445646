//! Time-ordered FIFO queue for one input channel.
//!
//! Uses index-based separation for better performance:
//! - HeapRb stores lightweight metadata (timestamp + slab key)
//! - Slab stores the actual measurement
//!
//! This avoids moving large feature frames during buffer operations.

use std::fmt;

use contracts::Timestamped;
use ringbuf::{traits::*, HeapRb};
use slab::Slab;

/// Lightweight metadata stored in ring buffer
#[derive(Debug, Clone, Copy)]
struct SlotMeta {
    /// Timestamp for ordering
    timestamp: f64,
    /// Key into the slab storage
    slab_key: usize,
}

/// Result of a push
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PushOutcome {
    Accepted,
    /// Accepted after evicting the oldest item (queue was full)
    AcceptedWithEviction { evicted: f64 },
    /// Not newer than the last accepted item; dropped
    Disorder { last: f64 },
}

impl PushOutcome {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Disorder { .. })
    }
}

/// Bounded FIFO with a strictly increasing timestamp invariant
pub struct TimedQueue<T> {
    /// Ring buffer of metadata (timestamp + slab key), oldest first
    index: HeapRb<SlotMeta>,
    /// Actual item storage
    storage: Slab<T>,
    max_size: usize,
    evicted_count: u64,
    disorder_count: u64,
    /// Last accepted timestamp; survives pops, reset by `clear`
    last_accepted: Option<f64>,
}

impl<T> fmt::Debug for TimedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedQueue")
            .field("len", &self.index.occupied_len())
            .field("max_size", &self.max_size)
            .field("evicted", &self.evicted_count)
            .field("disorder", &self.disorder_count)
            .finish()
    }
}

impl<T: Timestamped> TimedQueue<T> {
    /// Create a new queue
    #[inline]
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            index: HeapRb::new(max_size),
            storage: Slab::with_capacity(max_size),
            max_size,
            evicted_count: 0,
            disorder_count: 0,
            last_accepted: None,
        }
    }

    /// Append an item if it is strictly newer than the last accepted one.
    ///
    /// If the queue is full, the oldest item is evicted.
    #[inline]
    pub fn push(&mut self, item: T) -> PushOutcome {
        let timestamp = item.timestamp();

        if let Some(last) = self.last_accepted {
            if timestamp <= last {
                self.disorder_count += 1;
                return PushOutcome::Disorder { last };
            }
        }
        self.last_accepted = Some(timestamp);

        let mut outcome = PushOutcome::Accepted;
        if self.index.is_full() {
            if let Some(old_meta) = self.index.try_pop() {
                self.storage.remove(old_meta.slab_key);
                outcome = PushOutcome::AcceptedWithEviction {
                    evicted: old_meta.timestamp,
                };
            }
            self.evicted_count += 1;
        }

        let slab_key = self.storage.insert(item);
        let meta = SlotMeta {
            timestamp,
            slab_key,
        };
        let _ = self.index.try_push(meta);
        outcome
    }

    /// Peek at the oldest item without removing it
    #[inline]
    pub fn front(&self) -> Option<&T> {
        self.index
            .iter()
            .next()
            .and_then(|meta| self.storage.get(meta.slab_key))
    }

    /// Timestamp of the oldest item
    #[inline]
    pub fn front_timestamp(&self) -> Option<f64> {
        self.index.iter().next().map(|meta| meta.timestamp)
    }

    /// Timestamp of the newest item
    #[inline]
    pub fn back_timestamp(&self) -> Option<f64> {
        if self.index.is_empty() {
            None
        } else {
            self.last_accepted
        }
    }

    /// Remove and return the oldest item
    #[inline]
    pub fn pop_front(&mut self) -> Option<T> {
        let meta = self.index.try_pop()?;
        Some(self.storage.remove(meta.slab_key))
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.index
            .iter()
            .filter_map(|meta| self.storage.get(meta.slab_key))
    }

    /// Drop every item and forget the last accepted timestamp
    pub fn clear(&mut self) -> usize {
        let cleared = self.index.occupied_len();
        let _ = self.index.pop_iter().count();
        self.storage.clear();
        self.last_accepted = None;
        cleared
    }

    /// Get the number of items in the queue
    #[inline]
    pub fn len(&self) -> usize {
        self.index.occupied_len()
    }

    /// Check if the queue is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Last accepted timestamp (may belong to an already consumed item)
    #[inline]
    pub fn last_accepted(&self) -> Option<f64> {
        self.last_accepted
    }

    #[inline]
    pub fn evicted_count(&self) -> u64 {
        self.evicted_count
    }

    #[inline]
    pub fn disorder_count(&self) -> u64 {
        self.disorder_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ImuSample;
    use nalgebra::Vector3;

    fn sample(timestamp: f64) -> ImuSample {
        ImuSample::new(timestamp, Vector3::zeros(), Vector3::zeros())
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = TimedQueue::new(10);

        queue.push(sample(1.0));
        queue.push(sample(2.0));
        queue.push(sample(3.0));

        assert_eq!(queue.front_timestamp(), Some(1.0));
        assert_eq!(queue.back_timestamp(), Some(3.0));
        assert_eq!(queue.pop_front().unwrap().timestamp, 1.0);
        assert_eq!(queue.pop_front().unwrap().timestamp, 2.0);
        assert_eq!(queue.pop_front().unwrap().timestamp, 3.0);
        assert!(queue.pop_front().is_none());
        assert_eq!(queue.back_timestamp(), None);
    }

    #[test]
    fn test_disorder_rejected() {
        let mut queue = TimedQueue::new(10);

        assert_eq!(queue.push(sample(5.0)), PushOutcome::Accepted);
        assert_eq!(queue.push(sample(4.9)), PushOutcome::Disorder { last: 5.0 });
        assert_eq!(queue.push(sample(5.0)), PushOutcome::Disorder { last: 5.0 });

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.back_timestamp(), Some(5.0));
        assert_eq!(queue.disorder_count(), 2);
    }

    #[test]
    fn test_disorder_checked_against_consumed_items() {
        let mut queue = TimedQueue::new(10);
        queue.push(sample(1.0));
        queue.pop_front();

        assert!(!queue.push(sample(0.5)).is_accepted());
        assert!(queue.push(sample(1.5)).is_accepted());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut queue = TimedQueue::new(3);

        queue.push(sample(1.0));
        queue.push(sample(2.0));
        queue.push(sample(3.0));
        let outcome = queue.push(sample(4.0));

        assert_eq!(outcome, PushOutcome::AcceptedWithEviction { evicted: 1.0 });
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.evicted_count(), 1);
        assert_eq!(queue.front_timestamp(), Some(2.0));
    }

    #[test]
    fn test_front_does_not_consume() {
        let mut queue = TimedQueue::new(4);
        queue.push(sample(0.06));

        assert_eq!(queue.front().unwrap().timestamp, 0.06);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_clear_resets_order() {
        let mut queue = TimedQueue::new(4);
        queue.push(sample(3.0));
        queue.push(sample(4.0));

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert!(queue.push(sample(1.0)).is_accepted());
        assert_eq!(queue.iter().count(), 1);
    }
}
