//! Simulated time. Nothing in a DST run reads the wall clock.

use std::time::Duration;

/// Monotonic simulated clock in nanoseconds, advanced explicitly.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now_ns: u64,
}

impl SimClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn now_ns(&self) -> u64 {
        self.now_ns
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.now_ns)
    }

    /// Saturates at `u64::MAX` rather than wrapping.
    pub fn advance_ns(&mut self, ns: u64) {
        self.now_ns = self.now_ns.saturating_add(ns);
    }

    pub fn advance(&mut self, by: Duration) {
        self.advance_ns(u64::try_from(by.as_nanos()).unwrap_or(u64::MAX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance() {
        let mut clock = SimClock::new();
        clock.advance_ns(1_000);
        clock.advance(Duration::from_micros(2));
        assert_eq!(clock.now_ns(), 3_000);
        assert_eq!(clock.elapsed(), Duration::from_nanos(3_000));
        clock.advance(Duration::MAX);
        assert_eq!(clock.now_ns(), u64::MAX);
    }
}
