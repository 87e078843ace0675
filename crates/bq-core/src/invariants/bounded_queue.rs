//! Bounded queue invariants.
//!
//! | Property | # | Description |
//! |----------|---|-------------|
//! | NoLostItems | 1 | Every enqueued item is still queued or was dequeued |
//! | NoDuplicates | 2 | No item is delivered more often than it was enqueued |
//! | FifoOrder | 3 | Dequeues return items in linearized enqueue order |
//! | BoundedCapacity | 4 | The queue never holds more than `capacity` items |
//!
//! Items are compared as multisets, so the same value may be enqueued
//! more than once.

use std::collections::{HashMap, VecDeque};

use crate::counterexample::{Counterexample, StateSnapshot, SyncIssue};
use crate::property::{PropertyChecker, PropertyResult};

const SOURCE: &str = "bounded_queue";

/// Properties that any bounded queue implementation must expose for checking.
pub trait QueueProperties {
    /// Every item successfully enqueued, in linearization order.
    fn enqueued_items(&self) -> Vec<u64>;

    /// Every item successfully dequeued, in linearization order.
    fn dequeued_items(&self) -> Vec<u64>;

    /// Current contents, oldest first.
    fn current_contents(&self) -> Vec<u64>;

    /// Maximum number of items the queue may hold.
    fn capacity(&self) -> u64;

    /// Operation history. Returns owned data so implementations can keep
    /// it behind a mutex.
    fn history(&self) -> QueueHistory;
}

/// History of queue operations.
///
/// `step` is the linearization stamp taken inside the queue's critical
/// section, so sorting by it reproduces the order the queue observed.
#[derive(Debug, Clone, Default)]
pub struct QueueHistory {
    pub operations: Vec<QueueOperation>,
}

/// A single recorded operation.
#[derive(Debug, Clone)]
pub struct QueueOperation {
    /// Caller-chosen thread label
    pub thread_id: u64,
    pub op_type: QueueOpType,
    /// Item enqueued, or item returned by a dequeue
    pub item: Option<u64>,
    /// Linearization stamp
    pub step: u64,
}

/// Type of queue operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOpType {
    Enqueue,
    Dequeue,
    /// Non-blocking dequeue that observed an empty queue
    DequeueEmpty,
}

impl QueueHistory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    pub fn record_enqueue(&mut self, thread_id: u64, item: u64, step: u64) {
        debug_assert!(step > 0, "Step must be positive");
        self.operations.push(QueueOperation {
            thread_id,
            op_type: QueueOpType::Enqueue,
            item: Some(item),
            step,
        });
    }

    pub fn record_dequeue(&mut self, thread_id: u64, item: Option<u64>, step: u64) {
        debug_assert!(step > 0, "Step must be positive");
        self.operations.push(QueueOperation {
            thread_id,
            op_type: if item.is_some() {
                QueueOpType::Dequeue
            } else {
                QueueOpType::DequeueEmpty
            },
            item,
            step,
        });
    }

    /// Operations ordered by linearization stamp.
    #[must_use]
    pub fn linearized(&self) -> Vec<QueueOperation> {
        let mut ops = self.operations.clone();
        ops.sort_by_key(|op| op.step);
        ops
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Property checker for bounded queue implementations.
pub struct QueuePropertyChecker<'a, Q: QueueProperties> {
    queue: &'a Q,
    dst_seed: Option<u64>,
}

fn counts(items: impl IntoIterator<Item = u64>) -> HashMap<u64, usize> {
    let mut map = HashMap::new();
    for item in items {
        *map.entry(item).or_insert(0) += 1;
    }
    map
}

impl<'a, Q: QueueProperties> QueuePropertyChecker<'a, Q> {
    #[must_use]
    pub fn new(queue: &'a Q) -> Self {
        Self {
            queue,
            dst_seed: None,
        }
    }

    /// Attach a DST seed so counterexamples can be reproduced.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        self.dst_seed = Some(seed);
        self
    }

    fn counterexample(&self) -> Counterexample {
        match self.dst_seed {
            Some(seed) => Counterexample::with_seed(seed),
            None => Counterexample::new(),
        }
    }

    /// #1: NoLostItems
    fn check_no_lost_items(&self) -> PropertyResult {
        let enqueued = self.queue.enqueued_items();
        let dequeued = self.queue.dequeued_items();
        let contents = self.queue.current_contents();
        let delivered = counts(dequeued.iter().chain(contents.iter()).copied());

        for (item, expected) in counts(enqueued.iter().copied()) {
            let seen = delivered.get(&item).copied().unwrap_or(0);
            if seen < expected {
                let mut ce = self.counterexample();
                ce.add_state(StateSnapshot {
                    step: 1,
                    description: format!("Item {} lost", item),
                    variables: vec![
                        ("enqueued".to_string(), format!("{:?}", enqueued)),
                        ("dequeued".to_string(), format!("{:?}", dequeued)),
                        ("contents".to_string(), format!("{:?}", contents)),
                    ],
                });
                return PropertyResult::fail(
                    "NoLostItems",
                    SOURCE,
                    1,
                    format!(
                        "Item {} was enqueued {} time(s) but only {} accounted for",
                        item, expected, seen
                    ),
                    Some(ce),
                );
            }
        }

        PropertyResult::pass("NoLostItems", SOURCE, 1)
    }

    /// #2: NoDuplicates
    fn check_no_duplicates(&self) -> PropertyResult {
        let enqueued = counts(self.queue.enqueued_items());
        let delivered = counts(
            self.queue
                .dequeued_items()
                .into_iter()
                .chain(self.queue.current_contents()),
        );

        for (item, seen) in delivered {
            let expected = enqueued.get(&item).copied().unwrap_or(0);
            if seen > expected {
                return PropertyResult::fail(
                    "NoDuplicates",
                    SOURCE,
                    2,
                    format!(
                        "Item {} accounted for {} time(s) but enqueued {} time(s)",
                        item, seen, expected
                    ),
                    None,
                );
            }
        }

        PropertyResult::pass("NoDuplicates", SOURCE, 2)
    }

    /// #3: FifoOrder
    ///
    /// Replays the linearized history against a model queue. Every dequeue
    /// must return the model's front, an empty dequeue needs an empty model,
    /// and what is left in the model must equal the current contents.
    fn check_fifo_order(&self) -> PropertyResult {
        let history = self.queue.history();
        let mut model: VecDeque<u64> = VecDeque::new();

        for op in history.linearized() {
            match op.op_type {
                QueueOpType::Enqueue => {
                    if let Some(item) = op.item {
                        model.push_back(item);
                    }
                }
                QueueOpType::Dequeue => {
                    let expected = model.pop_front();
                    if expected != op.item {
                        return PropertyResult::fail(
                            "FifoOrder",
                            SOURCE,
                            3,
                            format!(
                                "Dequeue at step {} by thread {} returned {:?} but oldest item was {:?}",
                                op.step, op.thread_id, op.item, expected
                            ),
                            None,
                        );
                    }
                }
                QueueOpType::DequeueEmpty => {
                    if !model.is_empty() {
                        return PropertyResult::fail(
                            "FifoOrder",
                            SOURCE,
                            3,
                            format!(
                                "Dequeue at step {} saw an empty queue but {} item(s) were queued",
                                op.step,
                                model.len()
                            ),
                            None,
                        );
                    }
                }
            }
        }

        if history.is_empty() {
            return PropertyResult::pass("FifoOrder", SOURCE, 3);
        }

        let contents = self.queue.current_contents();
        if contents != Vec::from(model.clone()) {
            return PropertyResult::fail(
                "FifoOrder",
                SOURCE,
                3,
                format!(
                    "Contents {:?} differ from replayed history {:?}",
                    contents, model
                ),
                None,
            );
        }

        PropertyResult::pass("FifoOrder", SOURCE, 3)
    }

    /// #4: BoundedCapacity
    ///
    /// Checks the current contents and every prefix of the history.
    fn check_bounded_capacity(&self) -> PropertyResult {
        let capacity = self.queue.capacity();
        let len = self.queue.current_contents().len() as u64;

        let fail = |len: u64, step: u64, checker: &Self| {
            let mut ce = checker.counterexample();
            ce.add_sync_issue(SyncIssue::CapacityExceeded {
                len,
                capacity,
                step,
            });
            PropertyResult::fail(
                "BoundedCapacity",
                SOURCE,
                4,
                format!("Queue held {} items but capacity is {}", len, capacity),
                Some(ce),
            )
        };

        if len > capacity {
            return fail(len, 0, self);
        }

        let mut occupancy: u64 = 0;
        for op in self.queue.history().linearized() {
            match op.op_type {
                QueueOpType::Enqueue => occupancy += 1,
                QueueOpType::Dequeue => occupancy = occupancy.saturating_sub(1),
                QueueOpType::DequeueEmpty => {}
            }
            if occupancy > capacity {
                return fail(occupancy, op.step, self);
            }
        }

        PropertyResult::pass("BoundedCapacity", SOURCE, 4)
    }
}

impl<Q: QueueProperties> PropertyChecker for QueuePropertyChecker<'_, Q> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_no_lost_items(),
            self.check_no_duplicates(),
            self.check_fifo_order(),
            self.check_bounded_capacity(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sequential reference queue with full bookkeeping.
    struct TestQueue {
        capacity: u64,
        enqueued: Vec<u64>,
        dequeued: Vec<u64>,
        contents: VecDeque<u64>,
        history: QueueHistory,
    }

    impl TestQueue {
        fn new(capacity: u64) -> Self {
            Self {
                capacity,
                enqueued: Vec::new(),
                dequeued: Vec::new(),
                contents: VecDeque::new(),
                history: QueueHistory::new(),
            }
        }

        fn next_step(&self) -> u64 {
            self.history.len() as u64 + 1
        }

        fn enqueue(&mut self, item: u64) {
            let step = self.next_step();
            self.enqueued.push(item);
            self.contents.push_back(item);
            self.history.record_enqueue(0, item, step);
        }

        fn dequeue(&mut self) -> Option<u64> {
            let step = self.next_step();
            let item = self.contents.pop_front();
            if let Some(v) = item {
                self.dequeued.push(v);
            }
            self.history.record_dequeue(0, item, step);
            item
        }
    }

    impl QueueProperties for TestQueue {
        fn enqueued_items(&self) -> Vec<u64> {
            self.enqueued.clone()
        }

        fn dequeued_items(&self) -> Vec<u64> {
            self.dequeued.clone()
        }

        fn current_contents(&self) -> Vec<u64> {
            self.contents.iter().copied().collect()
        }

        fn capacity(&self) -> u64 {
            self.capacity
        }

        fn history(&self) -> QueueHistory {
            self.history.clone()
        }
    }

    fn result<'r>(results: &'r [PropertyResult], name: &str) -> &'r PropertyResult {
        results.iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn test_correct_queue_passes_all() {
        let mut queue = TestQueue::new(4);
        queue.enqueue(1);
        queue.enqueue(2);
        queue.enqueue(2);
        assert_eq!(queue.dequeue(), Some(1));
        queue.enqueue(3);
        assert_eq!(queue.dequeue(), Some(2));

        let checker = QueuePropertyChecker::new(&queue);
        assert!(checker.all_hold(), "{:?}", checker.failures());
    }

    #[test]
    fn test_empty_dequeue_recorded() {
        let mut queue = TestQueue::new(1);
        assert_eq!(queue.dequeue(), None);
        queue.enqueue(9);
        assert!(QueuePropertyChecker::new(&queue).all_hold());
    }

    #[test]
    fn test_lost_item_detected() {
        let mut queue = TestQueue::new(4);
        queue.enqueue(1);
        queue.enqueue(2);
        queue.contents.pop_back(); // 2 vanishes

        let results = QueuePropertyChecker::new(&queue).with_seed(7).check_all();
        let lost = result(&results, "NoLostItems");
        assert!(!lost.holds);
        assert!(lost.message.as_ref().unwrap().contains("Item 2"));
        assert_eq!(lost.counterexample.as_ref().unwrap().dst_seed, Some(7));
    }

    #[test]
    fn test_duplicate_detected() {
        let mut queue = TestQueue::new(4);
        queue.enqueue(5);
        assert_eq!(queue.dequeue(), Some(5));
        queue.contents.push_back(5); // delivered twice

        let results = QueuePropertyChecker::new(&queue).check_all();
        assert!(!result(&results, "NoDuplicates").holds);
    }

    #[test]
    fn test_out_of_order_dequeue_detected() {
        let mut queue = TestQueue::new(4);
        queue.enqueue(1);
        queue.enqueue(2);
        // Dequeue the newest item instead of the oldest
        let step = queue.next_step();
        let item = queue.contents.pop_back().unwrap();
        queue.dequeued.push(item);
        queue.history.record_dequeue(1, Some(item), step);

        let results = QueuePropertyChecker::new(&queue).check_all();
        let fifo = result(&results, "FifoOrder");
        assert!(!fifo.holds);
        assert!(fifo.message.as_ref().unwrap().contains("returned Some(2)"));
    }

    #[test]
    fn test_history_out_of_step_order_is_linearized() {
        let mut queue = TestQueue::new(2);
        queue.enqueue(1);
        queue.enqueue(2);
        queue.dequeue();
        queue.history.operations.reverse();

        assert!(QueuePropertyChecker::new(&queue).all_hold());
    }

    #[test]
    fn test_capacity_exceeded_detected() {
        let mut queue = TestQueue::new(2);
        queue.enqueue(1);
        queue.enqueue(2);
        queue.enqueue(3);

        let results = QueuePropertyChecker::new(&queue).check_all();
        let bounded = result(&results, "BoundedCapacity");
        assert!(!bounded.holds);
        let ce = bounded.counterexample.as_ref().unwrap();
        assert!(matches!(
            ce.sync_issues[0],
            SyncIssue::CapacityExceeded { len: 3, capacity: 2, .. }
        ));
    }
}
