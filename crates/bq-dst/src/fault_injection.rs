//! Fault injection at queue operation boundaries.
//!
//! Faults never happen inside the queue's critical section; the queue code
//! runs unmodified. The runner injects them around each call:
//!
//! | Fault | Before the call | After the call |
//! |-------|-----------------|----------------|
//! | `ThreadCrash` | operation never starts | result is lost to the caller |
//! | `Delay` | simulated clock advances | simulated clock advances |
//!
//! A crash after a dequeue means the item left the queue but no caller
//! consumed it; it still counts as dequeued for the invariants.

use std::collections::HashMap;

use bq_core::{PropertyResult, SyncIssue};
use bq_queue::{BoundedQueue, QueueError, TrackedQueue, WaitStrategy};
use tracing::trace;

use crate::fault::{FaultConfig, FaultInjector};
use crate::random::DeterministicRng;

const SOURCE: &str = "dst";

/// Where a fault is injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    BeforeOperation,
    AfterOperation,
}

/// Types of faults that can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    /// Caller "crashes" (operation abandoned or result dropped)
    ThreadCrash,
    /// Slow caller
    Delay,
}

/// Minimal queue interface needed by the runner.
pub trait DstTestableQueue: Send + Sync {
    /// # Errors
    ///
    /// `InvalidArgument` for a zero capacity.
    fn with_capacity(capacity: usize) -> Result<Self, QueueError>
    where
        Self: Sized;
    /// Non-blocking enqueue.
    fn offer(&self, value: u64) -> Result<(), QueueError>;
    /// Non-blocking dequeue.
    fn poll(&self) -> Result<u64, QueueError>;
    /// Current contents, oldest first.
    fn contents(&self) -> Vec<u64>;
    fn capacity(&self) -> usize;
}

impl<S: WaitStrategy> DstTestableQueue for BoundedQueue<u64, S> {
    fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        BoundedQueue::new(capacity)
    }

    fn offer(&self, value: u64) -> Result<(), QueueError> {
        self.try_enqueue(value).map_err(|e| e.reason())
    }

    fn poll(&self) -> Result<u64, QueueError> {
        self.try_dequeue()
    }

    fn contents(&self) -> Vec<u64> {
        self.snapshot().collect()
    }

    fn capacity(&self) -> usize {
        BoundedQueue::capacity(self)
    }
}

impl<S: WaitStrategy> DstTestableQueue for TrackedQueue<S> {
    fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        TrackedQueue::new(capacity)
    }

    fn offer(&self, value: u64) -> Result<(), QueueError> {
        self.try_enqueue(0, value).map_err(|e| e.reason())
    }

    fn poll(&self) -> Result<u64, QueueError> {
        self.try_dequeue(0)
    }

    fn contents(&self) -> Vec<u64> {
        self.queue().snapshot().collect()
    }

    fn capacity(&self) -> usize {
        self.queue().capacity()
    }
}

/// DST operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstOp {
    Enqueue(u64),
    Dequeue,
}

/// Sequential DST runner: wraps a queue, injects faults at boundaries and
/// tracks what actually happened for the invariant checks.
pub struct DstRunner<Q> {
    queue: Q,
    rng: DeterministicRng,
    fault_injector: FaultInjector,
    seed: u64,
    /// Accepted items, in order
    enqueued: Vec<u64>,
    /// Items taken out of the queue, in order
    dequeued: Vec<u64>,
    max_len_seen: usize,
    delay_ns_total: u64,
    operations_count: u64,
    faults_injected: u64,
    abandoned_operations: u64,
}

impl<Q: DstTestableQueue> DstRunner<Q> {
    /// # Errors
    ///
    /// `InvalidArgument` for a zero capacity.
    pub fn new(seed: u64, capacity: usize) -> Result<Self, QueueError> {
        Self::with_config(seed, capacity, FaultConfig::default())
    }

    /// # Errors
    ///
    /// `InvalidArgument` for a zero capacity.
    pub fn with_config(seed: u64, capacity: usize, config: FaultConfig) -> Result<Self, QueueError> {
        Ok(Self {
            queue: Q::with_capacity(capacity)?,
            rng: DeterministicRng::new(seed),
            fault_injector: FaultInjector::new(DeterministicRng::new(seed.wrapping_add(1)), config),
            seed,
            enqueued: Vec::new(),
            dequeued: Vec::new(),
            max_len_seen: 0,
            delay_ns_total: 0,
            operations_count: 0,
            faults_injected: 0,
            abandoned_operations: 0,
        })
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Enqueue with faults at the boundaries. `Ok(false)` means the queue
    /// was full; a real producer would wait here.
    ///
    /// # Errors
    ///
    /// The injected crash.
    pub fn enqueue(&mut self, value: u64) -> Result<bool, FaultType> {
        if self.inject(FaultPoint::BeforeOperation) == Some(FaultType::ThreadCrash) {
            return Err(FaultType::ThreadCrash);
        }

        let accepted = self.queue.offer(value).is_ok();
        self.operations_count += 1;
        if accepted {
            self.enqueued.push(value);
        }
        self.observe_len();

        if self.inject(FaultPoint::AfterOperation) == Some(FaultType::ThreadCrash) {
            return Err(FaultType::ThreadCrash);
        }
        Ok(accepted)
    }

    /// Dequeue with faults at the boundaries. `Ok(None)` means the queue
    /// was empty.
    ///
    /// # Errors
    ///
    /// The injected crash. A crash after the call drops the item.
    pub fn dequeue(&mut self) -> Result<Option<u64>, FaultType> {
        if self.inject(FaultPoint::BeforeOperation) == Some(FaultType::ThreadCrash) {
            return Err(FaultType::ThreadCrash);
        }

        let result = self.queue.poll().ok();
        self.operations_count += 1;
        if let Some(value) = result {
            self.dequeued.push(value);
        }
        self.observe_len();

        if self.inject(FaultPoint::AfterOperation) == Some(FaultType::ThreadCrash) {
            return Err(FaultType::ThreadCrash);
        }
        Ok(result)
    }

    fn observe_len(&mut self) {
        self.max_len_seen = self.max_len_seen.max(self.queue.contents().len());
    }

    fn inject(&mut self, point: FaultPoint) -> Option<FaultType> {
        if !self.fault_injector.should_fail() {
            return None;
        }
        self.faults_injected += 1;
        let fault = if self.rng.gen_bool(0.5) {
            FaultType::ThreadCrash
        } else {
            FaultType::Delay
        };
        trace!(?point, ?fault, "fault injected");
        match fault {
            FaultType::ThreadCrash => self.abandoned_operations += 1,
            FaultType::Delay => {
                self.delay_ns_total += self.fault_injector.delay_ns().unwrap_or(1);
            }
        }
        Some(fault)
    }

    /// Enqueued items are either still queued or were dequeued.
    #[must_use]
    pub fn check_no_lost_items(&self) -> bool {
        let mut remaining = multiset(&self.enqueued);
        for item in self.dequeued.iter().chain(self.queue.contents().iter()) {
            match remaining.get_mut(item) {
                Some(n) if *n > 0 => *n -= 1,
                _ => {}
            }
        }
        remaining.values().all(|&n| n == 0)
    }

    /// Nothing comes out more often than it went in.
    #[must_use]
    pub fn check_no_duplicates(&self) -> bool {
        let enqueued = multiset(&self.enqueued);
        let mut seen = multiset(&self.dequeued);
        for item in self.queue.contents() {
            *seen.entry(item).or_default() += 1;
        }
        seen.iter()
            .all(|(item, &n)| enqueued.get(item).copied().unwrap_or(0) >= n)
    }

    /// Dequeued items followed by the contents reproduce the enqueue
    /// order exactly.
    #[must_use]
    pub fn check_fifo(&self) -> bool {
        let mut observed = self.dequeued.clone();
        observed.extend(self.queue.contents());
        observed == self.enqueued
    }

    #[must_use]
    pub fn check_bounded_capacity(&self) -> bool {
        self.max_len_seen <= self.queue.capacity()
    }

    /// Every invariant as a `PropertyResult`.
    #[must_use]
    pub fn properties(&self) -> Vec<PropertyResult> {
        let seed_note = format!("DST_SEED={}", self.seed);
        let check = |name: &str, holds: bool, line: u32| {
            if holds {
                PropertyResult::pass(name, SOURCE, line)
            } else {
                PropertyResult::fail(name, SOURCE, line, seed_note.clone(), None)
            }
        };
        let mut results = vec![
            check("NoLostItems", self.check_no_lost_items(), 1),
            check("NoDuplicates", self.check_no_duplicates(), 2),
            check("FifoOrder", self.check_fifo(), 3),
            check("BoundedCapacity", self.check_bounded_capacity(), 4),
        ];
        if !self.check_bounded_capacity() {
            if let Some(result) = results.last_mut() {
                let mut counterexample = bq_core::Counterexample::with_seed(self.seed);
                counterexample.add_sync_issue(SyncIssue::CapacityExceeded {
                    len: self.max_len_seen as u64,
                    capacity: self.queue.capacity() as u64,
                    step: self.operations_count,
                });
                result.counterexample = Some(counterexample);
            }
        }
        results
    }

    #[must_use]
    pub fn stats(&self) -> DstStats {
        DstStats {
            seed: self.seed,
            operations_count: self.operations_count,
            faults_injected: self.faults_injected,
            abandoned_operations: self.abandoned_operations,
            delay_ns_total: self.delay_ns_total,
        }
    }
}

fn multiset(items: &[u64]) -> HashMap<u64, usize> {
    let mut counts = HashMap::new();
    for &item in items {
        *counts.entry(item).or_default() += 1;
    }
    counts
}

/// Statistics from a DST run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DstStats {
    pub seed: u64,
    pub operations_count: u64,
    pub faults_injected: u64,
    pub abandoned_operations: u64,
    pub delay_ns_total: u64,
}

impl DstStats {
    #[must_use]
    pub fn format(&self) -> String {
        format!(
            "DST_SEED={} ops={} faults={} abandoned={} delay_ns={}",
            self.seed,
            self.operations_count,
            self.faults_injected,
            self.abandoned_operations,
            self.delay_ns_total
        )
    }
}

/// Run `operations` against a fresh queue with fault injection and check
/// every invariant at the end.
///
/// # Errors
///
/// `InvalidArgument` for a zero capacity.
pub fn run_dst_scenario<Q: DstTestableQueue>(
    seed: u64,
    capacity: usize,
    operations: &[DstOp],
) -> Result<DstResult, QueueError> {
    let mut runner: DstRunner<Q> = DstRunner::new(seed, capacity)?;
    let mut fault_errors = Vec::new();

    for &op in operations {
        let result = match op {
            DstOp::Enqueue(v) => runner.enqueue(v).map(|_| ()),
            DstOp::Dequeue => runner.dequeue().map(|_| ()),
        };
        if let Err(fault) = result {
            fault_errors.push(format!("{:?}: {:?}", op, fault));
        }
    }

    let properties = runner.properties();
    Ok(DstResult {
        passed: properties.iter().all(|p| p.holds),
        properties,
        stats: runner.stats(),
        fault_errors,
    })
}

/// DST result.
#[derive(Debug)]
pub struct DstResult {
    pub passed: bool,
    pub properties: Vec<PropertyResult>,
    pub stats: DstStats,
    pub fault_errors: Vec<String>,
}

impl DstResult {
    #[must_use]
    pub fn format(&self) -> String {
        let status = if self.passed { "PASS" } else { "FAIL" };
        let mut result = format!("[{}] {}", status, self.stats.format());
        for property in self.properties.iter().filter(|p| !p.holds) {
            result.push_str(&format!("\n  VIOLATION: {}", property.name));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bq_queue::{Conditions, Monitor};
    use std::sync::Mutex;

    /// Unbounded "queue" that ignores its capacity.
    struct Overflowing {
        capacity: usize,
        items: Mutex<Vec<u64>>,
    }

    impl DstTestableQueue for Overflowing {
        fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
            Ok(Self {
                capacity,
                items: Mutex::new(Vec::new()),
            })
        }

        fn offer(&self, value: u64) -> Result<(), QueueError> {
            self.items.lock().unwrap().push(value);
            Ok(())
        }

        fn poll(&self) -> Result<u64, QueueError> {
            let mut items = self.items.lock().unwrap();
            if items.is_empty() {
                return Err(QueueError::Empty);
            }
            Ok(items.remove(0))
        }

        fn contents(&self) -> Vec<u64> {
            self.items.lock().unwrap().clone()
        }

        fn capacity(&self) -> usize {
            self.capacity
        }
    }

    fn ops() -> Vec<DstOp> {
        (0..200)
            .map(|i| if i % 3 == 2 { DstOp::Dequeue } else { DstOp::Enqueue(i) })
            .collect()
    }

    #[test]
    fn test_bounded_queue_survives_faults() {
        for seed in [1, 42, 12345] {
            let result = run_dst_scenario::<BoundedQueue<u64, Conditions>>(seed, 4, &ops()).unwrap();
            assert!(result.passed, "{}", result.format());
            let result = run_dst_scenario::<BoundedQueue<u64, Monitor>>(seed, 4, &ops()).unwrap();
            assert!(result.passed, "{}", result.format());
        }
    }

    #[test]
    fn test_tracked_queue_runner() {
        let result = run_dst_scenario::<TrackedQueue>(7, 2, &ops()).unwrap();
        assert!(result.passed, "{}", result.format());
    }

    #[test]
    fn test_overflow_is_caught() {
        let result = run_dst_scenario::<Overflowing>(3, 2, &ops()).unwrap();
        assert!(!result.passed);
        let violated: Vec<&str> = result
            .properties
            .iter()
            .filter(|p| !p.holds)
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(violated, vec!["BoundedCapacity"]);
        assert!(result.format().contains("VIOLATION: BoundedCapacity"));
    }

    #[test]
    fn test_determinism() {
        let a = run_dst_scenario::<BoundedQueue<u64>>(42, 3, &ops()).unwrap();
        let b = run_dst_scenario::<BoundedQueue<u64>>(42, 3, &ops()).unwrap();
        assert_eq!(a.stats, b.stats);
        assert_eq!(a.fault_errors, b.fault_errors);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = run_dst_scenario::<BoundedQueue<u64>>(1, 0, &ops());
        assert!(matches!(result, Err(QueueError::InvalidArgument(_))));
    }
}
