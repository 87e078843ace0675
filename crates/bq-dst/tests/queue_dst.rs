//! DST integration tests for the bounded queue.
//!
//! Seeds come from `DST_SEED` when set, so any failure printed here can be
//! replayed exactly.

use bq_core::{PropertyChecker, QueuePropertyChecker};
use bq_dst::{
    DstOp, DstRunner, FaultConfig, SimulationConfig, get_or_generate_seed, iterations_or,
    run_dst_scenario, simulate,
};
use bq_queue::{BoundedQueue, Conditions, Monitor, TrackedQueue};

fn random_ops(seed: u64, count: usize) -> Vec<DstOp> {
    let mut rng = bq_dst::DeterministicRng::new(seed);
    (0..count)
        .map(|i| {
            if rng.gen_bool(0.55) {
                DstOp::Enqueue(i as u64)
            } else {
                DstOp::Dequeue
            }
        })
        .collect()
}

#[test]
fn test_fault_injection_many_seeds() {
    let base = get_or_generate_seed();
    for i in 0..iterations_or(50) {
        let seed = base.wrapping_add(i).max(1);
        let ops = random_ops(seed, 300);
        for capacity in [1, 3, 8] {
            let result = run_dst_scenario::<BoundedQueue<u64, Conditions>>(seed, capacity, &ops).unwrap();
            assert!(result.passed, "{}", result.format());
            let result = run_dst_scenario::<BoundedQueue<u64, Monitor>>(seed, capacity, &ops).unwrap();
            assert!(result.passed, "{}", result.format());
        }
    }
}

#[test]
fn test_simulated_threads_many_seeds() {
    let base = get_or_generate_seed();
    let config = SimulationConfig {
        producers: 3,
        consumers: 3,
        items_per_producer: 15,
        capacity: 2,
        ..SimulationConfig::default()
    };
    for i in 0..iterations_or(30) {
        let seed = base.wrapping_add(i).max(1);
        let result = simulate::<Conditions>(seed, &config).unwrap();
        assert!(result.all_invariants_held, "{}", result.format());
        let result = simulate::<Monitor>(seed, &config).unwrap();
        assert!(result.all_invariants_held, "{}", result.format());
    }
}

#[test]
fn test_aggressive_faults_keep_tracked_history_consistent() {
    let seed = get_or_generate_seed();
    let mut runner: DstRunner<TrackedQueue> =
        DstRunner::with_config(seed, 2, FaultConfig::aggressive()).unwrap();

    for op in random_ops(seed, 500) {
        let _ = match op {
            DstOp::Enqueue(v) => runner.enqueue(v).map(|_| ()),
            DstOp::Dequeue => runner.dequeue().map(|_| ()),
        };
    }

    assert!(runner.properties().iter().all(|p| p.holds));
    // The tracked queue's own history tells the same story.
    let checker = QueuePropertyChecker::new(runner.queue()).with_seed(seed);
    let failures = checker.failures();
    assert!(failures.is_empty(), "DST_SEED={} {:?}", seed, failures);
}

#[test]
fn test_same_seed_same_run() {
    let config = SimulationConfig::default();
    let a = simulate::<Conditions>(4242, &config).unwrap();
    let b = simulate::<Conditions>(4242, &config).unwrap();
    assert_eq!(a.context_switches_count, b.context_switches_count);
    assert_eq!(a.blocked_count, b.blocked_count);
    assert_eq!(a.faults_injected_count, b.faults_injected_count);
}
