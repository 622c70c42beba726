//! Bounded Index Queue
//!
//! FIFO of buffer indices with the shift-register discipline of the
//! hardware driver: new entries enter at slot 0 and push older entries toward
//! the tail; removal always takes the tail-most occupied slot. Behaviourally
//! this is a plain FIFO, so it is stored as a `VecDeque` with a fixed
//! capacity instead of a sentinel-filled array.
//!
//! # Usage
//!
//! ```rust
//! use fimc_output::queue::IndexQueue;
//!
//! let mut queue = IndexQueue::new(3);
//! queue.push_front(0).unwrap();
//! queue.push_front(2).unwrap();
//!
//! assert_eq!(queue.slots(), vec![Some(2), Some(0), None]);
//! assert_eq!(queue.pop_tail(), Some(0));
//! assert_eq!(queue.pop_tail(), Some(2));
//! assert_eq!(queue.pop_tail(), None);
//! ```

use std::collections::VecDeque;

/// Error returned when pushing into a full queue; carries the rejected index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull(pub usize);

/// Fixed-capacity FIFO of buffer indices
#[derive(Debug, Clone)]
pub struct IndexQueue {
    // front = slot 0 (newest), back = tail-most occupied slot (oldest)
    entries: VecDeque<usize>,
    capacity: usize,
}

impl IndexQueue {
    /// Create an empty queue with `capacity` slots
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert a new entry at slot 0
    pub fn push_front(&mut self, index: usize) -> Result<(), QueueFull> {
        if self.is_full() {
            return Err(QueueFull(index));
        }
        self.entries.push_front(index);
        Ok(())
    }

    /// Remove the oldest entry
    pub fn pop_tail(&mut self) -> Option<usize> {
        self.entries.pop_back()
    }

    /// Oldest entry without removing it
    #[must_use]
    pub fn peek_tail(&self) -> Option<usize> {
        self.entries.back().copied()
    }

    /// Whether `index` is queued
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.entries.contains(&index)
    }

    /// Number of queued entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether every slot is occupied
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Slot capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Slot view: slot 0 is the newest entry, empty slots are `None`
    #[must_use]
    pub fn slots(&self) -> Vec<Option<usize>> {
        let mut slots: Vec<Option<usize>> = self.entries.iter().copied().map(Some).collect();
        slots.resize(self.capacity, None);
        slots
    }
}
