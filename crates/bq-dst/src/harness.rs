//! DST harness: reproducible simulated-thread runs.
//!
//! Simulated threads take turns under a seeded [`Scheduler`]. A step
//! either completes or reports that its thread would block; a blocked
//! thread is not scheduled again until some other step completes. If
//! every unfinished thread is blocked the run stops with a deadlock
//! violation.

use std::sync::PoisonError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::debug;

use crate::{DstEnv, FaultConfig, ScheduleDecision};

/// Configuration for the DST harness.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Number of simulated threads
    pub threads_count: usize,
    /// Completed steps each thread performs
    pub operations_per_thread: u64,
    /// Probability of a context switch at a yield point
    pub yield_probability: f64,
    pub fault_config: FaultConfig,
    /// Check invariants after every N operations (0 = only at the end)
    pub invariant_check_interval: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            threads_count: 4,
            operations_per_thread: 100,
            yield_probability: 0.2,
            fault_config: FaultConfig::default(),
            invariant_check_interval: 10,
        }
    }
}

impl HarnessConfig {
    /// Configuration for stress testing.
    #[must_use]
    pub fn stress() -> Self {
        Self {
            threads_count: 8,
            operations_per_thread: 1000,
            yield_probability: 0.3,
            fault_config: FaultConfig::aggressive(),
            invariant_check_interval: 100,
        }
    }

    /// Configuration for quick testing.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            threads_count: 2,
            operations_per_thread: 50,
            yield_probability: 0.1,
            fault_config: FaultConfig::none(),
            invariant_check_interval: 10,
        }
    }
}

/// Outcome of one simulated step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The step took effect; blocked threads get to re-check.
    Completed,
    /// The thread cannot proceed until another thread completes a step.
    Blocked,
}

/// Result of running the harness.
#[derive(Debug, Clone)]
pub struct HarnessResult {
    /// Seed used for reproduction
    pub seed: u64,
    pub operations_count: u64,
    /// Steps that found their thread blocked
    pub blocked_count: u64,
    pub context_switches_count: u64,
    pub faults_injected_count: u64,
    pub invariant_checks_count: u64,
    pub all_invariants_held: bool,
    /// First violation (if any)
    pub first_violation: Option<String>,
}

/// Deterministic harness over simulated threads.
///
/// Given the same seed, the same interleaving is produced.
pub struct DstHarness {
    env: DstEnv,
    config: HarnessConfig,
    operations_count: AtomicU64,
    blocked_count: AtomicU64,
    context_switches_count: AtomicU64,
    invariant_checks_count: AtomicU64,
    violation: std::sync::Mutex<Option<String>>,
    stopped: AtomicBool,
}

impl DstHarness {
    #[must_use]
    pub fn new(seed: u64, config: HarnessConfig) -> Self {
        assert!(config.threads_count > 0, "must have at least one thread");
        debug_assert!(
            config.threads_count <= 64,
            "too many threads for DST: {}",
            config.threads_count
        );

        let env = DstEnv::with_scheduler(
            seed,
            config.threads_count,
            config.yield_probability,
            config.fault_config.clone(),
        );

        Self {
            env,
            config,
            operations_count: AtomicU64::new(0),
            blocked_count: AtomicU64::new(0),
            context_switches_count: AtomicU64::new(0),
            invariant_checks_count: AtomicU64::new(0),
            violation: std::sync::Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.env.seed()
    }

    pub fn env(&mut self) -> &mut DstEnv {
        &mut self.env
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stop the run. Only the first violation is kept.
    pub fn stop_with_violation(&self, message: String) {
        let mut guard = self.violation.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            debug!(seed = self.env.seed(), %message, "DST violation");
            *guard = Some(message);
        }
        self.stopped.store(true, Ordering::Release);
    }

    fn should_check_invariants(&self) -> bool {
        let interval = self.config.invariant_check_interval;
        interval != 0 && self.operations_count.load(Ordering::Relaxed) % interval == 0
    }

    fn check<I>(&self, check_invariants: &mut I) -> bool
    where
        I: FnMut() -> Result<(), String>,
    {
        self.invariant_checks_count.fetch_add(1, Ordering::Relaxed);
        match check_invariants() {
            Ok(()) => true,
            Err(e) => {
                self.stop_with_violation(e);
                false
            }
        }
    }

    /// Run one thread's steps in order. Blocking is a violation here,
    /// since no other thread could unblock it.
    pub fn run_single_threaded<F, T, R>(&mut self, mut generate_op: F, mut execute: R) -> HarnessResult
    where
        F: FnMut(&mut DstEnv, u64) -> Option<T>,
        R: FnMut(&mut DstEnv, T) -> Result<Step, String>,
    {
        let total_ops = self.config.operations_per_thread;
        let mut step = 0u64;

        while step < total_ops && !self.is_stopped() {
            if let Some(op) = generate_op(&mut self.env, step) {
                match execute(&mut self.env, op) {
                    Ok(Step::Completed) => {
                        self.operations_count.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(Step::Blocked) => {
                        self.stop_with_violation(format!("single thread blocked at step {}", step));
                        break;
                    }
                    Err(e) => {
                        self.stop_with_violation(e);
                        break;
                    }
                }
            }
            self.env.maybe_delay();
            step += 1;
        }

        self.build_result()
    }

    /// Run interleaved simulated threads.
    ///
    /// `generate_op(env, thread, step)` yields the next operation for a
    /// thread; `step` only advances when that thread completes a step, so
    /// a blocked operation is generated again when the thread retries.
    /// Returning `None` finishes the thread early.
    pub fn run_concurrent<F, T, R, I>(
        &mut self,
        mut generate_op: F,
        mut execute: R,
        mut check_invariants: I,
    ) -> HarnessResult
    where
        F: FnMut(&mut DstEnv, usize, u64) -> Option<T>,
        R: FnMut(&mut DstEnv, usize, T) -> Result<Step, String>,
        I: FnMut() -> Result<(), String>,
    {
        let threads_count = self.config.threads_count;
        let ops_per_thread = self.config.operations_per_thread;
        let mut thread_steps: Vec<u64> = vec![0; threads_count];
        let mut finished: Vec<bool> = vec![ops_per_thread == 0; threads_count];

        while !self.is_stopped() && !finished.iter().all(|&f| f) {
            let Some(scheduler) = self.env.scheduler() else {
                self.stop_with_violation("harness has no scheduler".to_string());
                break;
            };
            let current = scheduler.current_thread();

            if finished[current] || scheduler.is_blocked(current) {
                for (thread, &done) in finished.iter().enumerate() {
                    if done {
                        scheduler.set_blocked(thread, true);
                    }
                }
                if scheduler.all_blocked() {
                    let waiting: Vec<usize> = (0..threads_count).filter(|&t| !finished[t]).collect();
                    self.stop_with_violation(format!("deadlock: threads {:?} blocked", waiting));
                    break;
                }
                scheduler.force_switch();
                continue;
            }

            let Some(op) = generate_op(&mut self.env, current, thread_steps[current]) else {
                finished[current] = true;
                continue;
            };
            match execute(&mut self.env, current, op) {
                Ok(Step::Completed) => {
                    self.operations_count.fetch_add(1, Ordering::Relaxed);
                    thread_steps[current] += 1;
                    if thread_steps[current] >= ops_per_thread {
                        finished[current] = true;
                    }
                    if let Some(scheduler) = self.env.scheduler() {
                        scheduler.unblock_all();
                    }
                    if self.should_check_invariants() && !self.check(&mut check_invariants) {
                        break;
                    }
                }
                Ok(Step::Blocked) => {
                    self.blocked_count.fetch_add(1, Ordering::Relaxed);
                    if let Some(scheduler) = self.env.scheduler() {
                        scheduler.set_blocked(current, true);
                    }
                }
                Err(e) => {
                    self.stop_with_violation(format!("thread {}: {}", current, e));
                    break;
                }
            }

            self.env.maybe_delay();
            if let Some(scheduler) = self.env.scheduler() {
                if scheduler.decide() != ScheduleDecision::Continue {
                    self.context_switches_count.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        if !self.is_stopped() {
            self.check(&mut check_invariants);
        }

        self.build_result()
    }

    fn build_result(&mut self) -> HarnessResult {
        let violation = self
            .violation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        HarnessResult {
            seed: self.env.seed(),
            operations_count: self.operations_count.load(Ordering::Relaxed),
            blocked_count: self.blocked_count.load(Ordering::Relaxed),
            context_switches_count: self.context_switches_count.load(Ordering::Relaxed),
            faults_injected_count: self.env.fault().stats().faults_count,
            invariant_checks_count: self.invariant_checks_count.load(Ordering::Relaxed),
            all_invariants_held: violation.is_none(),
            first_violation: violation,
        }
    }
}

impl HarnessResult {
    #[must_use]
    pub fn format(&self) -> String {
        let status = if self.all_invariants_held { "PASS" } else { "FAIL" };

        let mut result = format!(
            "[{}] DST_SEED={} ops={} blocked={} switches={} faults={} checks={}",
            status,
            self.seed,
            self.operations_count,
            self.blocked_count,
            self.context_switches_count,
            self.faults_injected_count,
            self.invariant_checks_count
        );

        if let Some(ref violation) = self.first_violation {
            result.push_str(&format!("\n  Violation: {}", violation));
        }

        result
    }
}
