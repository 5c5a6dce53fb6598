//! Fixed-capacity circular history buffer.
//!
//! A [`HistoryBuffer`] stores up to `capacity` items in a backing store that
//! is allocated once. Items are addressed by their *logical* position: index
//! `0` is the oldest item and `len() - 1` the newest. Back-relative accessors
//! ([`get_back`](HistoryBuffer::get_back), [`at_back`](HistoryBuffer::at_back))
//! address the same items newest-first.
//!
//! ```text
//!   slots:  [ e ][ f ][ b ][ c ][ d ]      capacity = 5
//!                      ^start              len = 5
//!
//!   logical order: b c d e f   (0 = b = oldest, 4 = f = newest)
//!   push(g) overwrites b, start advances to c
//! ```
//!
//! # Overflow policy
//!
//! - [`push`](HistoryBuffer::push) never fails: when the buffer is full the
//!   oldest item is overwritten. The evicted value is not surfaced; callers
//!   that need to observe eviction [`dequeue`](HistoryBuffer::dequeue) first.
//! - [`try_push`](HistoryBuffer::try_push) refuses when full and hands the
//!   item back.
//!
//! # Complexity
//!
//! Every operation is O(1) except [`resize`](HistoryBuffer::resize)
//! (O(capacity)) and [`partition_point`](HistoryBuffer::partition_point)
//! (O(log n)). Indexed access is bounds-checked against the logical length
//! and never wraps.

use std::fmt;
use std::iter::FusedIterator;
use std::ops::{Index, IndexMut};

use crate::HistoryError;

// ---------------------------------------------------------------------------
// HistoryBuffer
// ---------------------------------------------------------------------------

/// A circular buffer that keeps the most recent `capacity` items.
///
/// The backing store is a boxed slice of optional slots sized to the
/// capacity. It is only reallocated by an explicit [`resize`](Self::resize).
#[derive(Clone)]
pub struct HistoryBuffer<T> {
    /// Physical storage. Slots outside the logical window may still hold
    /// stale values after [`clear`](Self::clear); they are overwritten by
    /// later pushes.
    slots: Box<[Option<T>]>,
    /// Physical index of the oldest item.
    start: usize,
    /// Number of items in the logical window.
    len: usize,
}

impl<T> HistoryBuffer<T> {
    /// Create an empty buffer able to hold `capacity` items.
    ///
    /// A zero-capacity buffer is valid: it stays empty and silently drops
    /// everything pushed into it.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: empty_slots(capacity),
            start: 0,
            len: 0,
        }
    }

    // -- queries ------------------------------------------------------------

    /// The maximum number of items the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The number of items currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no items are stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if the next [`push`](Self::push) would evict an item.
    pub fn is_full(&self) -> bool {
        self.len >= self.capacity()
    }

    /// Returns `true` if `index` addresses a stored item (0 = oldest).
    pub fn contains_index(&self, index: usize) -> bool {
        index < self.len
    }

    /// Map a logical index to its physical slot. Requires a non-zero capacity.
    fn physical(&self, logical: usize) -> usize {
        (self.start + logical) % self.slots.len()
    }

    // -- insertion ----------------------------------------------------------

    /// Append `item` as the newest entry, overwriting the oldest entry if the
    /// buffer is full.
    pub fn push(&mut self, item: T) {
        let capacity = self.capacity();
        if capacity == 0 {
            return;
        }

        let position = self.physical(self.len);
        if self.len == capacity {
            // The write lands on the oldest slot; the window slides forward.
            self.start = (self.start + 1) % capacity;
        } else {
            self.len += 1;
        }
        self.slots[position] = Some(item);
    }

    /// Append `item` only if the buffer is not full.
    ///
    /// # Errors
    ///
    /// Returns the item back, leaving the buffer untouched, when full.
    pub fn try_push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        self.push(item);
        Ok(())
    }

    // -- removal ------------------------------------------------------------

    /// Remove and return the newest item (LIFO), or `None` if empty.
    pub fn try_pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let position = self.physical(self.len - 1);
        self.len -= 1;
        self.slots[position].take()
    }

    /// Remove and return the newest item (LIFO).
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Empty`] if there is nothing to pop.
    pub fn pop(&mut self) -> Result<T, HistoryError> {
        self.try_pop()
            .ok_or(HistoryError::Empty { operation: "pop" })
    }

    /// Remove and return the oldest item (FIFO), or `None` if empty.
    pub fn try_dequeue(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let position = self.start;
        self.start = (self.start + 1) % self.capacity();
        self.len -= 1;
        self.slots[position].take()
    }

    /// Remove and return the oldest item (FIFO).
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Empty`] if there is nothing to dequeue.
    pub fn dequeue(&mut self) -> Result<T, HistoryError> {
        self.try_dequeue()
            .ok_or(HistoryError::Empty {
                operation: "dequeue",
            })
    }

    /// Reset to empty in O(1). The backing store is kept.
    pub fn clear(&mut self) {
        self.start = 0;
        self.len = 0;
    }

    // -- inspection ---------------------------------------------------------

    /// The newest item, or `None` if empty.
    pub fn try_peek(&self) -> Option<&T> {
        self.get_back(0)
    }

    /// The newest item.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Empty`] if the buffer is empty.
    pub fn peek(&self) -> Result<&T, HistoryError> {
        self.try_peek()
            .ok_or(HistoryError::Empty { operation: "peek" })
    }

    /// The oldest item, or `None` if empty.
    pub fn oldest(&self) -> Option<&T> {
        self.get(0)
    }

    /// The item at logical `index` (0 = oldest).
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        self.slots[self.physical(index)].as_ref()
    }

    /// Mutable access to the item at logical `index` (0 = oldest).
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index >= self.len {
            return None;
        }
        let position = self.physical(index);
        self.slots[position].as_mut()
    }

    /// The item `back` positions from the newest end (0 = newest).
    pub fn get_back(&self, back: usize) -> Option<&T> {
        if back >= self.len {
            return None;
        }
        self.get(self.len - 1 - back)
    }

    /// Bounds-checked access at logical `index` (0 = oldest).
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::OutOfRange`] if `index >= len()`.
    pub fn at(&self, index: usize) -> Result<&T, HistoryError> {
        self.get(index).ok_or(HistoryError::OutOfRange {
            index,
            len: self.len,
        })
    }

    /// Bounds-checked access `back` positions from the newest end.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::OutOfRange`] if `back >= len()`.
    pub fn at_back(&self, back: usize) -> Result<&T, HistoryError> {
        self.get_back(back).ok_or(HistoryError::OutOfRange {
            index: back,
            len: self.len,
        })
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            buffer: self,
            front: 0,
            back: self.len,
        }
    }

    /// Binary search for the first logical index whose item does not satisfy
    /// `pred`, assuming the buffer is partitioned (all `true` items precede
    /// all `false` items). Same contract as [`slice::partition_point`].
    pub fn partition_point<P>(&self, mut pred: P) -> usize
    where
        P: FnMut(&T) -> bool,
    {
        let mut low = 0;
        let mut high = self.len;
        while low < high {
            let mid = low + (high - low) / 2;
            match self.get(mid) {
                Some(item) if pred(item) => low = mid + 1,
                _ => high = mid,
            }
        }
        low
    }

    // -- resizing -----------------------------------------------------------

    /// Change the capacity, keeping the newest `min(new_capacity, len())`
    /// items in their original order.
    ///
    /// Growing keeps every item; shrinking discards the oldest ones.
    pub fn resize(&mut self, new_capacity: usize) {
        if new_capacity == self.capacity() {
            return;
        }

        let keep = self.len.min(new_capacity);
        let skip = self.len - keep;
        let mut slots = empty_slots(new_capacity);
        for (offset, slot) in slots.iter_mut().take(keep).enumerate() {
            let position = self.physical(skip + offset);
            *slot = self.slots[position].take();
        }

        self.slots = slots;
        self.start = 0;
        self.len = keep;
    }
}

impl<T: Clone> HistoryBuffer<T> {
    /// Copy the stored items into a `Vec`, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

fn empty_slots<T>(capacity: usize) -> Box<[Option<T>]> {
    std::iter::repeat_with(|| None).take(capacity).collect()
}

// ---------------------------------------------------------------------------
// Trait impls
// ---------------------------------------------------------------------------

impl<T> From<Vec<T>> for HistoryBuffer<T> {
    /// Adopt `items` as a full buffer whose capacity equals their count.
    fn from(items: Vec<T>) -> Self {
        let len = items.len();
        Self {
            slots: items.into_iter().map(Some).collect(),
            start: 0,
            len,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for HistoryBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryBuffer")
            .field("capacity", &self.capacity())
            .field("items", &DebugItems(self))
            .finish()
    }
}

struct DebugItems<'a, T>(&'a HistoryBuffer<T>);

impl<T: fmt::Debug> fmt::Debug for DebugItems<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl<T> Index<usize> for HistoryBuffer<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        let len = self.len;
        self.get(index)
            .unwrap_or_else(|| panic!("history index {index} out of range (len {len})"))
    }
}

impl<T> IndexMut<usize> for HistoryBuffer<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        let len = self.len;
        self.get_mut(index)
            .unwrap_or_else(|| panic!("history index {index} out of range (len {len})"))
    }
}

impl<'a, T> IntoIterator for &'a HistoryBuffer<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ---------------------------------------------------------------------------
// Iter
// ---------------------------------------------------------------------------

/// Oldest-to-newest iterator over a [`HistoryBuffer`].
#[derive(Debug, Clone)]
pub struct Iter<'a, T> {
    buffer: &'a HistoryBuffer<T>,
    front: usize,
    back: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.front >= self.back {
            return None;
        }
        let item = self.buffer.get(self.front);
        self.front += 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        self.buffer.get(self.back)
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
