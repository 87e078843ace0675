//! # bq-dst
//!
//! Deterministic simulation testing for the bounded blocking queue.
//!
//! Time, randomness, scheduling and faults are all derived from one seed,
//! so a failing run is reproduced by its seed alone.
//!
//! - `fault_injection`: sequential runs with faults at operation boundaries
//! - `simulation`: producers and consumers as seeded simulated threads
//! - `stress`: real OS threads, reported as JSON by the `bq-stress` binary
//!
//! ## Usage
//!
//! ```rust
//! use bq_dst::DstEnv;
//!
//! let mut env = DstEnv::new(12345);
//!
//! env.clock().advance_ns(1_000_000);
//! let value: u64 = env.rng().gen();
//! let choice = env.rng().gen_range(0..10);
//! if env.fault().should_fail() {
//!     // simulate a crashed caller
//! }
//! # let _ = (value, choice);
//! ```
//!
//! To reproduce a failing test:
//! ```bash
//! DST_SEED=12345 cargo test -p bq-dst
//! ```

pub mod clock;
pub mod env;
pub mod fault;
pub mod fault_injection;
pub mod harness;
pub mod random;
pub mod scheduler;
pub mod simulation;
pub mod stress;

pub use clock::SimClock;
pub use env::DstEnv;
pub use fault::{FaultConfig, FaultInjector, FaultStats};
pub use fault_injection::{
    DstOp, DstResult, DstRunner, DstStats, DstTestableQueue, FaultPoint, FaultType, run_dst_scenario,
};
pub use harness::{DstHarness, HarnessConfig, HarnessResult, Step};
pub use random::DeterministicRng;
pub use scheduler::{ScheduleDecision, Scheduler};
pub use simulation::{SimulationConfig, simulate};
pub use stress::{ConfigError, StrategyKind, StressConfig, StressError, StressReport, run_stress};

/// Get the DST seed from `DST_SEED` or generate a random one.
///
/// Prints the seed for reproduction.
///
/// # Panics
///
/// If `DST_SEED` is set but is not a `u64`.
#[must_use]
pub fn get_or_generate_seed() -> u64 {
    match std::env::var("DST_SEED") {
        Ok(s) => {
            let seed: u64 = s.parse().expect("DST_SEED must be a valid u64");
            println!("DST_SEED={} (from environment)", seed);
            seed
        }
        Err(_) => {
            // Zero is reserved for "no seed" in counterexamples.
            let seed = rand::random::<u64>().max(1);
            println!("DST_SEED={} (randomly generated)", seed);
            seed
        }
    }
}

/// Iteration count from `DST_ITERATIONS`, or `default`.
#[must_use]
pub fn iterations_or(default: u64) -> u64 {
    std::env::var("DST_ITERATIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
