//! The DST environment: one seed, and everything derived from it.

use crate::clock::SimClock;
use crate::fault::{FaultConfig, FaultInjector};
use crate::random::DeterministicRng;
use crate::scheduler::Scheduler;

/// Seeded time, randomness, faults and (optionally) scheduling.
///
/// Each component gets its own RNG stream derived from the seed, so adding
/// draws to one does not perturb the others.
#[derive(Debug, Clone)]
pub struct DstEnv {
    seed: u64,
    rng: DeterministicRng,
    clock: SimClock,
    fault: FaultInjector,
    scheduler: Option<Scheduler>,
}

impl DstEnv {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_fault_config(seed, FaultConfig::default())
    }

    #[must_use]
    pub fn with_fault_config(seed: u64, config: FaultConfig) -> Self {
        Self {
            seed,
            rng: DeterministicRng::new(seed),
            clock: SimClock::new(),
            fault: FaultInjector::new(DeterministicRng::new(seed.wrapping_add(1)), config),
            scheduler: None,
        }
    }

    /// Environment with a scheduler over `threads_count` simulated threads.
    #[must_use]
    pub fn with_scheduler(
        seed: u64,
        threads_count: usize,
        yield_probability: f64,
        config: FaultConfig,
    ) -> Self {
        let mut env = Self::with_fault_config(seed, config);
        env.scheduler = Some(Scheduler::new(
            DeterministicRng::new(seed.wrapping_add(2)),
            threads_count,
            yield_probability,
        ));
        env
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn rng(&mut self) -> &mut DeterministicRng {
        &mut self.rng
    }

    pub fn clock(&mut self) -> &mut SimClock {
        &mut self.clock
    }

    pub fn fault(&mut self) -> &mut FaultInjector {
        &mut self.fault
    }

    pub fn scheduler(&mut self) -> Option<&mut Scheduler> {
        self.scheduler.as_mut()
    }

    /// Maybe advance the clock by a simulated delay. Returns the delay.
    pub fn maybe_delay(&mut self) -> Option<u64> {
        let delay = self.fault.delay_ns()?;
        self.clock.advance_ns(delay);
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_is_reproducible() {
        let mut a = DstEnv::new(12345);
        let mut b = DstEnv::new(12345);
        for _ in 0..100 {
            assert_eq!(a.rng().gen::<u64>(), b.rng().gen::<u64>());
            assert_eq!(a.fault().should_fail(), b.fault().should_fail());
            assert_eq!(a.maybe_delay(), b.maybe_delay());
        }
        assert_eq!(a.clock().now_ns(), b.clock().now_ns());
    }

    #[test]
    fn test_scheduler_only_when_requested() {
        let mut plain = DstEnv::new(1);
        assert!(plain.scheduler().is_none());
        let mut scheduled = DstEnv::with_scheduler(1, 3, 0.2, FaultConfig::none());
        assert_eq!(scheduled.scheduler().map(|s| s.threads_count()), Some(3));
        assert_eq!(scheduled.maybe_delay(), None);
    }
}
