//! Bounded per-interval sample buffer.
//!
//! The sampler appends every reading to the buffer of the interval in progress. Once
//! the buffer is full, further readings of that interval are rejected and counted as
//! dropped; the caller keeps counting them towards the total. The buffer never grows
//! past the capacity it was created with.

/// Outcome of [`IntervalBuffer::push`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pushed<T> {
    /// The value was appended.
    Stored,
    /// The buffer was full; the value is handed back.
    Dropped(T),
}

impl<T> Pushed<T> {
    /// `true` if the value was appended.
    pub fn is_stored(&self) -> bool {
        matches!(self, Pushed::Stored)
    }
}

/// Fixed-capacity, insertion-ordered buffer with push-or-reject semantics.
#[derive(Debug, Clone)]
pub struct IntervalBuffer<T> {
    items: Vec<T>,
    capacity: usize,
    dropped: u64,
}

impl<T> IntervalBuffer<T> {
    /// Preallocate a buffer for `capacity` values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Append `value` if room remains.
    pub fn push(&mut self, value: T) -> Pushed<T> {
        if self.items.len() < self.capacity {
            self.items.push(value);
            Pushed::Stored
        } else {
            self.dropped = self.dropped.saturating_add(1);
            Pushed::Dropped(value)
        }
    }

    /// Values stored so far, oldest first.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `true` once `len() == capacity()`.
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Maximum number of stored values.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Values rejected since the last [`clear`](Self::clear) or [`take`](Self::take).
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Empty the buffer, keeping its allocation.
    pub fn clear(&mut self) {
        self.items.clear();
        self.dropped = 0;
    }
}

impl<T: Copy> IntervalBuffer<T> {
    /// Copy out the stored values and the drop count, then clear.
    pub fn take(&mut self) -> (Vec<T>, u64) {
        let values = self.items.clone();
        let dropped = self.dropped;
        self.clear();
        (values, dropped)
    }
}
