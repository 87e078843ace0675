//! Deterministic scheduling of simulated threads.
//!
//! Simulated threads run one step at a time. After each step the
//! scheduler may switch to another runnable thread; threads reported as
//! blocked are skipped until something unblocks them.

use crate::random::DeterministicRng;

/// What to do at a yield point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Keep running the current thread
    Continue,
    /// Switch to the given thread
    SwitchTo(usize),
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    rng: DeterministicRng,
    threads_count: usize,
    current: usize,
    yield_probability: f64,
    blocked: Vec<bool>,
}

impl Scheduler {
    #[must_use]
    pub fn new(rng: DeterministicRng, threads_count: usize, yield_probability: f64) -> Self {
        assert!(threads_count > 0, "scheduler needs at least one thread");
        Self {
            rng,
            threads_count,
            current: 0,
            yield_probability,
            blocked: vec![false; threads_count],
        }
    }

    #[must_use]
    pub fn threads_count(&self) -> usize {
        self.threads_count
    }

    #[must_use]
    pub fn current_thread(&self) -> usize {
        self.current
    }

    pub fn set_blocked(&mut self, thread: usize, blocked: bool) {
        self.blocked[thread] = blocked;
    }

    #[must_use]
    pub fn is_blocked(&self, thread: usize) -> bool {
        self.blocked[thread]
    }

    /// Unblock every thread; they re-check their condition when run.
    pub fn unblock_all(&mut self) {
        self.blocked.iter_mut().for_each(|b| *b = false);
    }

    /// Every thread is blocked: nothing can make progress.
    #[must_use]
    pub fn all_blocked(&self) -> bool {
        self.blocked.iter().all(|&b| b)
    }

    /// Yield point. Switches when the current thread is blocked, and
    /// otherwise with `yield_probability`.
    pub fn decide(&mut self) -> ScheduleDecision {
        let must_switch = self.blocked[self.current];
        if !must_switch && !self.rng.gen_bool(self.yield_probability) {
            return ScheduleDecision::Continue;
        }
        match self.pick_other() {
            Some(next) => {
                self.current = next;
                ScheduleDecision::SwitchTo(next)
            }
            None => ScheduleDecision::Continue,
        }
    }

    /// Switch to some other runnable thread, if there is one.
    pub fn force_switch(&mut self) -> ScheduleDecision {
        match self.pick_other() {
            Some(next) => {
                self.current = next;
                ScheduleDecision::SwitchTo(next)
            }
            None => ScheduleDecision::Continue,
        }
    }

    /// Switch to a specific thread.
    pub fn switch_to(&mut self, thread: usize) {
        assert!(thread < self.threads_count, "no thread {}", thread);
        self.current = thread;
    }

    fn pick_other(&mut self) -> Option<usize> {
        let candidates: Vec<usize> = (0..self.threads_count)
            .filter(|&t| t != self.current && !self.blocked[t])
            .collect();
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[self.rng.gen_range(0..candidates.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_thread_never_switches() {
        let mut scheduler = Scheduler::new(DeterministicRng::new(1), 1, 1.0);
        for _ in 0..10 {
            assert_eq!(scheduler.decide(), ScheduleDecision::Continue);
        }
    }

    #[test]
    fn test_blocked_thread_is_switched_away_from() {
        let mut scheduler = Scheduler::new(DeterministicRng::new(1), 3, 0.0);
        scheduler.set_blocked(0, true);
        scheduler.set_blocked(1, true);
        assert_eq!(scheduler.decide(), ScheduleDecision::SwitchTo(2));
        assert_eq!(scheduler.current_thread(), 2);

        scheduler.set_blocked(2, true);
        assert!(scheduler.all_blocked());
        scheduler.unblock_all();
        assert!(!scheduler.is_blocked(0));
    }

    #[test]
    fn test_same_seed_same_schedule() {
        let run = |seed| {
            let mut scheduler = Scheduler::new(DeterministicRng::new(seed), 4, 0.5);
            (0..50)
                .map(|_| scheduler.decide())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(11), run(11));
    }
}
