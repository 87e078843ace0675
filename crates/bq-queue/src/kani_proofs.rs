//! Kani proof harnesses for the ring buffer.
//!
//! Bounded model checking of the index arithmetic behind the queue. The
//! harnesses are sequential; interleavings are covered by the loom tests
//! and the stateright model.
//!
//! ```bash
//! cargo kani -p bq-queue
//! cargo kani -p bq-queue --harness proof_fifo_across_wraparound
//! ```

#[cfg(kani)]
mod proofs {
    use crate::ring::Ring;

    /// Any push/pop sequence keeps `tail == (head + len) % capacity` and
    /// the slot occupancy consistent.
    #[kani::proof]
    #[kani::unwind(7)]
    fn proof_indices_stay_consistent() {
        let capacity: usize = kani::any();
        kani::assume(capacity > 0 && capacity <= 3);
        let mut ring = Ring::with_capacity(capacity);

        for step in 0..6u64 {
            if kani::any() {
                if !ring.is_full() {
                    ring.push_back(step);
                }
            } else {
                let was_empty = ring.is_empty();
                let popped = ring.pop_front();
                kani::assert(popped.is_none() == was_empty, "pop fails only when empty");
            }
            kani::assert(ring.len() <= ring.capacity(), "len never exceeds capacity");
        }
        ring.check_invariants();
    }

    /// Items come out in the order they went in, even after the indices
    /// wrap.
    #[kani::proof]
    #[kani::unwind(5)]
    fn proof_fifo_across_wraparound() {
        let mut ring = Ring::with_capacity(2);
        let a: u64 = kani::any();
        let b: u64 = kani::any();
        let c: u64 = kani::any();

        ring.push_back(a);
        ring.push_back(b);
        kani::assert(ring.pop_front() == Some(a), "first in, first out");
        ring.push_back(c);
        kani::assert(ring.pop_front() == Some(b), "second item after wrap");
        kani::assert(ring.pop_front() == Some(c), "wrapped item last");
        kani::assert(ring.is_empty(), "drained");
    }

    #[kani::proof]
    fn proof_empty_pop_returns_none() {
        let mut ring: Ring<u64> = Ring::with_capacity(1);
        kani::assert(ring.pop_front().is_none(), "pop on empty ring must return None");
    }
}
