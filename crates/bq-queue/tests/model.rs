//! Property tests: the queue behaves like a bounded `VecDeque`.

#![cfg(not(loom))]

use std::collections::VecDeque;

use bq_queue::{BoundedQueue, Monitor, QueueError};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Enqueue(u64),
    Dequeue,
    Close,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => any::<u64>().prop_map(Op::Enqueue),
        5 => Just(Op::Dequeue),
        1 => Just(Op::Close),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_matches_vecdeque_model(
        capacity in 1usize..6,
        ops in prop::collection::vec(op(), 1..200)
    ) {
        let queue: BoundedQueue<u64> = BoundedQueue::new(capacity).unwrap();
        let mut model: VecDeque<u64> = VecDeque::new();
        let mut closed = false;

        for op in ops {
            match op {
                Op::Enqueue(v) => {
                    let result = queue.try_enqueue(v);
                    if closed {
                        prop_assert_eq!(result.map_err(|e| e.reason()), Err(QueueError::Closed));
                    } else if model.len() == capacity {
                        prop_assert_eq!(result.map_err(|e| e.reason()), Err(QueueError::Full));
                    } else {
                        prop_assert!(result.is_ok());
                        model.push_back(v);
                    }
                }
                Op::Dequeue => {
                    let expected = match model.pop_front() {
                        Some(v) => Ok(v),
                        None if closed => Err(QueueError::NoSuchElement),
                        None => Err(QueueError::Empty),
                    };
                    prop_assert_eq!(queue.try_dequeue(), expected);
                }
                Op::Close => {
                    prop_assert_eq!(queue.close(), !closed);
                    closed = true;
                }
            }
            prop_assert_eq!(queue.len(), model.len());
            prop_assert!(queue.len() <= capacity);
            prop_assert_eq!(queue.is_full(), model.len() == capacity);
        }
        prop_assert_eq!(queue.snapshot().collect::<Vec<_>>(), model.into_iter().collect::<Vec<_>>());
        queue.check_invariants();
    }

    #[test]
    fn prop_fifo_through_wraparound(
        values in prop::collection::vec(any::<u64>(), 1..300),
        capacity in 1usize..8
    ) {
        let queue: BoundedQueue<u64, Monitor> = BoundedQueue::new(capacity).unwrap();
        let mut out = Vec::with_capacity(values.len());
        for chunk in values.chunks(capacity) {
            for &v in chunk {
                queue.enqueue(v).unwrap();
            }
            while let Ok(v) = queue.try_dequeue() {
                out.push(v);
            }
        }
        prop_assert_eq!(out, values);
    }
}
