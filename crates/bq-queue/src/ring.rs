//! Fixed-capacity ring buffer with head/tail/len bookkeeping.
//!
//! Not synchronized; the queue only touches it while holding its lock.
//!
//! # Invariants
//!
//! - `len <= capacity`
//! - occupied slots are `slots[(head + i) % capacity]` for `i in 0..len`,
//!   oldest first, and every other slot is `None`
//! - `tail == (head + len) % capacity`
//!
//! A broken invariant is an illegal state and panics.

pub(crate) struct Ring<T> {
    slots: Box<[Option<T>]>,
    /// Next slot to dequeue
    head: usize,
    /// Next free slot
    tail: usize,
    len: usize,
}

impl<T> Ring<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be positive");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    #[inline]
    fn advance(&self, index: usize) -> usize {
        (index + 1) % self.capacity()
    }

    /// Write at `tail`. The caller has checked that the ring is not full.
    pub(crate) fn push_back(&mut self, item: T) {
        assert!(!self.is_full(), "illegal state: push into a full ring");
        let slot = &mut self.slots[self.tail];
        assert!(slot.is_none(), "illegal state: tail slot {} occupied", self.tail);
        *slot = Some(item);
        self.tail = self.advance(self.tail);
        self.len += 1;
        self.debug_check();
    }

    /// Take the item at `head`, leaving the slot empty.
    pub(crate) fn pop_front(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let Some(item) = self.slots[self.head].take() else {
            panic!(
                "illegal state: head slot {} empty with len {}",
                self.head, self.len
            );
        };
        self.head = self.advance(self.head);
        self.len -= 1;
        self.debug_check();
        Some(item)
    }

    /// Items oldest first.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |i| self.slots[(self.head + i) % self.capacity()].as_ref())
    }

    #[inline]
    fn debug_check(&self) {
        #[cfg(debug_assertions)]
        self.check_invariants();
    }

    /// Panics if any ring invariant is broken.
    pub(crate) fn check_invariants(&self) {
        let capacity = self.capacity();
        assert!(self.len <= capacity, "illegal state: len {} > capacity {}", self.len, capacity);
        assert!(self.head < capacity && self.tail < capacity, "illegal state: index out of range");
        assert_eq!(
            self.tail,
            (self.head + self.len) % capacity,
            "illegal state: tail does not follow head + len"
        );
        for i in 0..capacity {
            let offset = (i + capacity - self.head) % capacity;
            let occupied = self.slots[i].is_some();
            assert_eq!(
                occupied,
                offset < self.len,
                "illegal state: slot {} occupancy disagrees with head {} / len {}",
                i,
                self.head,
                self.len
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_fifo() {
        let mut ring = Ring::with_capacity(3);
        ring.push_back(1);
        ring.push_back(2);
        assert_eq!(ring.pop_front(), Some(1));
        ring.push_back(3);
        ring.push_back(4);
        assert!(ring.is_full());
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(ring.pop_front(), Some(2));
        assert_eq!(ring.pop_front(), Some(3));
        assert_eq!(ring.pop_front(), Some(4));
        assert_eq!(ring.pop_front(), None);
        ring.check_invariants();
    }

    #[test]
    fn test_wraparound_keeps_indices_consistent() {
        let mut ring = Ring::with_capacity(2);
        for i in 0..10 {
            ring.push_back(i);
            assert_eq!(ring.pop_front(), Some(i));
            assert_eq!(ring.tail, (ring.head + ring.len) % 2);
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn test_pop_clears_slot() {
        let mut ring = Ring::with_capacity(1);
        ring.push_back(String::from("x"));
        assert!(ring.is_full());
        assert_eq!(ring.pop_front().as_deref(), Some("x"));
        assert!(ring.slots.iter().all(Option::is_none));
    }

    #[test]
    #[should_panic(expected = "push into a full ring")]
    fn test_push_into_full_ring_panics() {
        let mut ring = Ring::with_capacity(1);
        ring.push_back(1);
        ring.push_back(2);
    }

    #[test]
    #[should_panic(expected = "illegal state")]
    fn test_corrupted_len_is_detected() {
        let mut ring = Ring::with_capacity(4);
        ring.push_back(1);
        ring.len = 3;
        ring.check_invariants();
    }
}
