//! Blocking behaviour of the queue under real threads.
//!
//! Every test runs against both wait strategies.

#![cfg(not(loom))]

use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use bq_queue::{BoundedQueue, CancelToken, Conditions, Monitor, QueueError, WaitStrategy};

/// Give a spawned thread time to reach its wait.
const SETTLE: Duration = Duration::from_millis(50);

fn wait_for_len<T, S: WaitStrategy>(queue: &BoundedQueue<T, S>, len: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while queue.len() != len {
        assert!(Instant::now() < deadline, "queue never reached len {}", len);
        thread::sleep(Duration::from_millis(1));
    }
}

fn backpressure_releases_blocked_enqueuer<S: WaitStrategy>() {
    let queue: BoundedQueue<char, S> = BoundedQueue::new(2).unwrap();
    queue.enqueue('A').unwrap();
    assert_eq!(queue.size(), 1);
    queue.enqueue('B').unwrap();
    assert_eq!(queue.size(), 2);

    let producer = {
        let queue = queue.clone();
        thread::spawn(move || queue.enqueue('C'))
    };
    thread::sleep(SETTLE);
    assert!(!producer.is_finished(), "enqueue into a full queue must block");
    assert_eq!(queue.size(), 2);

    assert_eq!(queue.dequeue(), Ok('A'));
    producer.join().unwrap().unwrap();
    assert_eq!(queue.snapshot().collect::<Vec<_>>(), vec!['B', 'C']);
    assert_eq!(queue.size(), 2);
}

#[test]
fn test_backpressure_conditions() {
    backpressure_releases_blocked_enqueuer::<Conditions>();
}

#[test]
fn test_backpressure_monitor() {
    backpressure_releases_blocked_enqueuer::<Monitor>();
}

fn cancelled_dequeue_leaves_queue_intact<S: WaitStrategy>() {
    let queue: BoundedQueue<u32, S> = BoundedQueue::new(4).unwrap();
    let token = CancelToken::new();

    let cancelled = {
        let queue = queue.clone();
        let token = token.clone();
        thread::spawn(move || queue.dequeue_cancellable(&token))
    };
    // A second consumer on its own token must not be affected.
    let bystander = {
        let queue = queue.clone();
        thread::spawn(move || queue.dequeue_timeout(Duration::from_secs(5)))
    };
    thread::sleep(SETTLE);

    token.cancel();
    assert_eq!(cancelled.join().unwrap(), Err(QueueError::Interrupted));
    assert_eq!(queue.size(), 0);
    assert!(queue.is_empty());

    queue.enqueue(9).unwrap();
    assert_eq!(bystander.join().unwrap(), Ok(9));
    queue.check_invariants();
}

#[test]
fn test_cancellation_conditions() {
    cancelled_dequeue_leaves_queue_intact::<Conditions>();
}

#[test]
fn test_cancellation_monitor() {
    cancelled_dequeue_leaves_queue_intact::<Monitor>();
}

#[test]
fn test_cancelled_enqueue_returns_item() {
    let queue: BoundedQueue<String> = BoundedQueue::new(1).unwrap();
    queue.enqueue("kept".to_string()).unwrap();
    let token = CancelToken::new();

    let producer = {
        let queue = queue.clone();
        let token = token.clone();
        thread::spawn(move || queue.enqueue_cancellable("returned".to_string(), &token))
    };
    thread::sleep(SETTLE);
    token.cancel();

    let err = producer.join().unwrap().unwrap_err();
    assert_eq!(err.reason(), QueueError::Interrupted);
    assert_eq!(err.into_item(), "returned");
    assert_eq!(queue.snapshot().collect::<Vec<_>>(), vec!["kept".to_string()]);
}

#[test]
fn test_snapshot_is_idempotent() {
    let queue: BoundedQueue<u32> = BoundedQueue::new(3).unwrap();
    queue.enqueue(1).unwrap();
    queue.enqueue(2).unwrap();
    queue.dequeue().unwrap();
    queue.enqueue(3).unwrap();
    queue.enqueue(4).unwrap();

    let first: Vec<u32> = queue.snapshot().collect();
    let second: Vec<u32> = queue.snapshot().collect();
    assert_eq!(first, second);
    assert_eq!(first, vec![2, 3, 4]);
    assert_eq!(queue.snapshot().len(), 3);
}

fn spsc_preserves_order<S: WaitStrategy>() {
    const ITEMS: u64 = 10_000;
    let queue: BoundedQueue<u64, S> = BoundedQueue::new(8).unwrap();

    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            for i in 0..ITEMS {
                queue.enqueue(i).unwrap();
            }
        })
    };
    for expected in 0..ITEMS {
        assert_eq!(queue.dequeue(), Ok(expected));
    }
    producer.join().unwrap();
    assert!(queue.is_empty());
}

#[test]
fn test_spsc_fifo_conditions() {
    spsc_preserves_order::<Conditions>();
}

#[test]
fn test_spsc_fifo_monitor() {
    spsc_preserves_order::<Monitor>();
}

fn mpmc_delivers_each_item_once<S: WaitStrategy>() {
    const PRODUCERS: u64 = 4;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: u64 = 2_000;
    let queue: BoundedQueue<u64, S> = BoundedQueue::new(3).unwrap();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    queue.enqueue(p * PER_PRODUCER + i).unwrap();
                    assert!(queue.len() <= queue.capacity());
                }
            })
        })
        .collect();
    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut seen = Vec::new();
                // Drain until closed and empty.
                while let Ok(item) = queue.dequeue() {
                    seen.push(item);
                }
                seen
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    queue.close();

    let mut counts: HashMap<u64, usize> = HashMap::new();
    for consumer in consumers {
        let seen = consumer.join().unwrap();
        // Per-producer order survives even with many consumers.
        for p in 0..PRODUCERS {
            let mine: Vec<u64> = seen.iter().copied().filter(|v| v / PER_PRODUCER == p).collect();
            assert!(mine.windows(2).all(|w| w[0] < w[1]));
        }
        for item in seen {
            *counts.entry(item).or_default() += 1;
        }
    }
    assert_eq!(counts.len() as u64, PRODUCERS * PER_PRODUCER);
    assert!(counts.values().all(|&c| c == 1));
}

#[test]
fn test_mpmc_conditions() {
    mpmc_delivers_each_item_once::<Conditions>();
}

#[test]
fn test_mpmc_monitor() {
    mpmc_delivers_each_item_once::<Monitor>();
}

#[test]
fn test_each_dequeue_unblocks_one_producer() {
    let queue: BoundedQueue<u32> = BoundedQueue::new(1).unwrap();
    queue.enqueue(0).unwrap();

    let producers: Vec<_> = (1..=3)
        .map(|i| {
            let queue = queue.clone();
            thread::spawn(move || queue.enqueue(i))
        })
        .collect();
    thread::sleep(SETTLE);

    let mut delivered = vec![queue.dequeue().unwrap()];
    for _ in 0..3 {
        // Exactly one producer can refill the single slot.
        wait_for_len(&queue, 1);
        delivered.push(queue.dequeue().unwrap());
    }
    for producer in producers {
        producer.join().unwrap().unwrap();
    }
    delivered.sort_unstable();
    assert_eq!(delivered, vec![0, 1, 2, 3]);
}

#[test]
fn test_independent_queues_do_not_interfere() {
    let a: BoundedQueue<u8> = BoundedQueue::new(1).unwrap();
    let b: BoundedQueue<u8> = BoundedQueue::new(1).unwrap();
    a.enqueue(1).unwrap();
    b.enqueue(2).unwrap();
    a.close();
    assert!(!b.is_closed());
    assert_eq!(b.dequeue(), Ok(2));
    assert_eq!(a.dequeue(), Ok(1));
}
