//! Real-thread stress runs.
//!
//! `producers` OS threads each enqueue `items_per_producer` distinct items
//! while `consumers` threads drain the queue; the queue is closed once
//! every producer is done. The report says whether every item arrived
//! exactly once and whether each producer's items stayed in order.
//!
//! A consumer that stalls closes the queue, which releases any producer
//! blocked on a full queue with `Closed`. The run then finishes and is
//! reported as failed.

use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use bq_queue::{BoundedQueue, Conditions, Monitor, QueueError, WaitStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Upper bound on producer + consumer threads.
pub const THREADS_MAX: usize = 256;

/// Which wait strategy a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Conditions,
    Monitor,
}

impl StrategyKind {
    #[must_use]
    pub fn all() -> [StrategyKind; 2] {
        [StrategyKind::Conditions, StrategyKind::Monitor]
    }
}

/// A rejected stress configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be positive")]
    NotPositive(&'static str),
    #[error("too many threads: {0} (max {THREADS_MAX})")]
    TooManyThreads(usize),
}

#[derive(Debug, Error)]
pub enum StressError {
    #[error("invalid stress config: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    pub producers: usize,
    pub consumers: usize,
    pub items_per_producer: u64,
    pub capacity: usize,
    pub strategy: StrategyKind,
    /// A consumer that waits this long without an item reports a stall.
    pub stall_timeout_ms: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            producers: 4,
            consumers: 4,
            items_per_producer: 10_000,
            capacity: 16,
            strategy: StrategyKind::Conditions,
            stall_timeout_ms: 10_000,
        }
    }
}

impl StressConfig {
    /// Small run for tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            producers: 2,
            consumers: 2,
            items_per_producer: 1_000,
            capacity: 2,
            ..Self::default()
        }
    }

    /// # Errors
    ///
    /// The first field that is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.producers == 0 {
            return Err(ConfigError::NotPositive("producers"));
        }
        if self.consumers == 0 {
            return Err(ConfigError::NotPositive("consumers"));
        }
        if self.capacity == 0 {
            return Err(ConfigError::NotPositive("capacity"));
        }
        if self.stall_timeout_ms == 0 {
            return Err(ConfigError::NotPositive("stall_timeout_ms"));
        }
        let threads = self.producers + self.consumers;
        if threads > THREADS_MAX {
            return Err(ConfigError::TooManyThreads(threads));
        }
        Ok(())
    }
}

/// Outcome of one stress run.
#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub config: StressConfig,
    pub strategy: &'static str,
    pub items_expected: u64,
    pub items_delivered: u64,
    /// Items delivered more than once
    pub duplicates: u64,
    /// Items never delivered
    pub missing: u64,
    /// Consumer observations where a producer's items arrived out of order
    pub fifo_violations: u64,
    /// Consumers that gave up waiting
    pub stalled_consumers: u64,
    /// Producers stopped early by a closed queue
    pub rejected_producers: u64,
    pub elapsed_ms: u64,
    pub throughput_ops_per_sec: f64,
    pub passed: bool,
}

/// Run one stress configuration on OS threads.
///
/// # Errors
///
/// An invalid configuration.
pub fn run_stress(config: &StressConfig) -> Result<StressReport, StressError> {
    config.validate()?;
    match config.strategy {
        StrategyKind::Conditions => run_with::<Conditions>(config, Duration::ZERO),
        StrategyKind::Monitor => run_with::<Monitor>(config, Duration::ZERO),
    }
}

/// Producers sleep `producer_delay` before their first enqueue.
fn run_with<S: WaitStrategy>(
    config: &StressConfig,
    producer_delay: Duration,
) -> Result<StressReport, StressError> {
    let queue: BoundedQueue<u64, S> = BoundedQueue::new(config.capacity)?;
    let stall_timeout = Duration::from_millis(config.stall_timeout_ms);
    let per_producer = config.items_per_producer;
    info!(
        strategy = S::NAME,
        producers = config.producers,
        consumers = config.consumers,
        capacity = config.capacity,
        "stress run starting"
    );

    let start = Instant::now();
    let (outcomes, rejected_producers) = thread::scope(|scope| {
        let consumers: Vec<_> = (0..config.consumers)
            .map(|_| {
                let queue = queue.clone();
                scope.spawn(move || consume(&queue, stall_timeout))
            })
            .collect();

        let producers: Vec<_> = (0..config.producers as u64)
            .map(|p| {
                let queue = queue.clone();
                scope.spawn(move || {
                    if !producer_delay.is_zero() {
                        thread::sleep(producer_delay);
                    }
                    for i in 0..per_producer {
                        if let Err(e) = queue.enqueue(p * per_producer + i) {
                            warn!(producer = p, reason = %e.reason(), "enqueue rejected");
                            return false;
                        }
                    }
                    true
                })
            })
            .collect();

        let mut rejected = 0u64;
        for producer in producers {
            match producer.join() {
                Ok(true) => {}
                Ok(false) => rejected += 1,
                Err(_) => {
                    warn!("producer panicked");
                    rejected += 1;
                }
            }
        }
        queue.close();

        let outcomes: Vec<ConsumerOutcome> = consumers
            .into_iter()
            .filter_map(|consumer| consumer.join().ok())
            .collect();
        (outcomes, rejected)
    });
    let elapsed = start.elapsed();

    let report = build_report(config, S::NAME, &outcomes, rejected_producers, elapsed);
    info!(
        strategy = S::NAME,
        passed = report.passed,
        elapsed_ms = report.elapsed_ms,
        "stress run finished"
    );
    Ok(report)
}

struct ConsumerOutcome {
    items: Vec<u64>,
    stalled: bool,
}

fn consume<S: WaitStrategy>(queue: &BoundedQueue<u64, S>, stall_timeout: Duration) -> ConsumerOutcome {
    let mut items = Vec::new();
    loop {
        match queue.dequeue_timeout(stall_timeout) {
            Ok(item) => items.push(item),
            Err(QueueError::NoSuchElement) => return ConsumerOutcome { items, stalled: false },
            Err(e) => {
                warn!(reason = %e, received = items.len(), "consumer stalled");
                queue.close();
                return ConsumerOutcome { items, stalled: true };
            }
        }
    }
}

fn build_report(
    config: &StressConfig,
    strategy: &'static str,
    outcomes: &[ConsumerOutcome],
    rejected_producers: u64,
    elapsed: Duration,
) -> StressReport {
    let per_producer = config.items_per_producer;
    let items_expected = config.producers as u64 * per_producer;

    let mut counts: HashMap<u64, u64> = HashMap::new();
    let mut fifo_violations = 0;
    for outcome in outcomes {
        let mut last_seen: HashMap<u64, u64> = HashMap::new();
        for &item in &outcome.items {
            *counts.entry(item).or_default() += 1;
            let producer = item / per_producer;
            if let Some(previous) = last_seen.insert(producer, item) {
                if previous >= item {
                    fifo_violations += 1;
                }
            }
        }
    }

    let items_delivered: u64 = counts.values().sum();
    let duplicates = counts.values().filter(|&&n| n > 1).map(|&n| n - 1).sum();
    let missing = (0..items_expected).filter(|item| !counts.contains_key(item)).count() as u64;
    let stalled_consumers = outcomes.iter().filter(|o| o.stalled).count() as u64;
    let lost_consumers = (config.consumers - outcomes.len()) as u64;

    let elapsed_secs = elapsed.as_secs_f64();
    let throughput_ops_per_sec = if elapsed_secs > 0.0 {
        (2 * items_delivered) as f64 / elapsed_secs
    } else {
        0.0
    };

    StressReport {
        config: config.clone(),
        strategy,
        items_expected,
        items_delivered,
        duplicates,
        missing,
        fifo_violations,
        stalled_consumers: stalled_consumers + lost_consumers,
        rejected_producers,
        elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        throughput_ops_per_sec,
        passed: duplicates == 0
            && missing == 0
            && fifo_violations == 0
            && stalled_consumers + lost_consumers == 0
            && rejected_producers == 0,
    }
}
