//! Producer/consumer workloads on the DST harness.
//!
//! Simulated producers and consumers drive a [`TrackedQueue`] through its
//! non-blocking calls. `Full` and `Empty` park the simulated thread, the
//! same way the real queue would put it to sleep, so the seeded scheduler
//! explores blocking interleavings without OS threads.

use bq_core::{PropertyChecker, QueuePropertyChecker};
use bq_queue::{QueueError, TrackedQueue, WaitStrategy};

use crate::fault::FaultConfig;
use crate::harness::{DstHarness, HarnessConfig, HarnessResult, Step};

/// Shape of a simulated workload.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub producers: usize,
    pub consumers: usize,
    pub items_per_producer: u64,
    pub capacity: usize,
    pub yield_probability: f64,
    pub fault_config: FaultConfig,
    /// Run the property checker after every N completed steps
    pub invariant_check_interval: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            producers: 3,
            consumers: 2,
            items_per_producer: 20,
            capacity: 2,
            yield_probability: 0.3,
            fault_config: FaultConfig::default(),
            invariant_check_interval: 7,
        }
    }
}

impl SimulationConfig {
    fn threads_count(&self) -> usize {
        self.producers + self.consumers
    }

    fn total_items(&self) -> u64 {
        self.producers as u64 * self.items_per_producer
    }

    /// Items consumer `index` takes; the total is split as evenly as
    /// possible.
    fn consumer_quota(&self, index: usize) -> u64 {
        let consumers = self.consumers as u64;
        let base = self.total_items() / consumers;
        let extra = u64::from((index as u64) < self.total_items() % consumers);
        base + extra
    }
}

#[derive(Debug, Clone, Copy)]
enum SimOp {
    Enqueue(u64),
    Dequeue,
}

/// Run a simulated producer/consumer workload and check the queue
/// properties along the way.
///
/// Threads `0..producers` are producers, the rest consumers. Item values
/// are `producer * items_per_producer + i`, so every item is distinct.
///
/// # Errors
///
/// `InvalidArgument` if the capacity is zero or there are no producers
/// or consumers.
pub fn simulate<S: WaitStrategy>(
    seed: u64,
    config: &SimulationConfig,
) -> Result<HarnessResult, QueueError> {
    if config.producers == 0 || config.consumers == 0 {
        return Err(QueueError::InvalidArgument("need producers and consumers"));
    }
    let queue: TrackedQueue<S> = TrackedQueue::new(config.capacity)?;
    let quota_max = config.items_per_producer.max(config.consumer_quota(0));

    let harness_config = HarnessConfig {
        threads_count: config.threads_count(),
        operations_per_thread: quota_max,
        yield_probability: config.yield_probability,
        fault_config: config.fault_config.clone(),
        invariant_check_interval: config.invariant_check_interval,
    };
    let mut harness = DstHarness::new(seed, harness_config);

    let producers = config.producers;
    let items_per_producer = config.items_per_producer;
    let result = harness.run_concurrent(
        |_env, thread, step| {
            if thread < producers {
                (step < items_per_producer)
                    .then(|| SimOp::Enqueue(thread as u64 * items_per_producer + step))
            } else {
                (step < config.consumer_quota(thread - producers)).then_some(SimOp::Dequeue)
            }
        },
        |_env, thread, op| {
            let thread_id = thread as u64;
            let outcome = match op {
                SimOp::Enqueue(value) => queue.try_enqueue(thread_id, value).map_err(|e| e.reason()),
                SimOp::Dequeue => queue.try_dequeue(thread_id).map(|_| ()),
            };
            match outcome {
                Ok(()) => Ok(Step::Completed),
                Err(QueueError::Full | QueueError::Empty) => Ok(Step::Blocked),
                Err(e) => Err(format!("{:?} failed: {}", op, e)),
            }
        },
        || {
            let failures = QueuePropertyChecker::new(&queue).with_seed(seed).failures();
            match failures.first() {
                None => Ok(()),
                Some(failure) => Err(failure.format()),
            }
        },
    );

    Ok(result)
}
