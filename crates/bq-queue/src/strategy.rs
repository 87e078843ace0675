//! Wait strategies: how blocked producers and consumers are put to sleep
//! and woken.
//!
//! | Strategy | Wait sets | Wake on change |
//! |----------|-----------|----------------|
//! | [`Conditions`] | `not_full`, `not_empty` | one waiter of the other class |
//! | [`Monitor`] | one shared | every waiter, each re-checks its predicate |
//!
//! A single shared wait set combined with wake-one is deliberately not
//! offered: a wakeup can land on a waiter of the wrong class while the
//! eligible one keeps sleeping. `bq-stateright` model-checks that variant
//! to a deadlock.

use std::time::Duration;

use crate::sync::{self, Condvar, MutexGuard};

/// The predicate a waiter is sleeping on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// A slot was freed (producers wait on this).
    SpaceAvailable,
    /// An item was added (consumers wait on this).
    ItemAvailable,
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Conditions {}
    impl Sealed for super::Monitor {}
}

/// Condition-variable scheme used by a [`crate::BoundedQueue`].
///
/// Every method is called with the queue lock held (or, for `wait*`,
/// with its guard). Waiters always re-check their predicate, so a wake
/// never has to be exact, only sufficient.
pub trait WaitStrategy: sealed::Sealed + Default + Send + Sync + 'static {
    /// Short name for logs and reports.
    const NAME: &'static str;

    /// Release the lock and sleep until woken for `signal`.
    fn wait<'a, U>(&self, signal: Signal, guard: MutexGuard<'a, U>) -> MutexGuard<'a, U>;

    /// Like [`WaitStrategy::wait`], for at most `timeout`.
    fn wait_timeout<'a, U>(
        &self,
        signal: Signal,
        guard: MutexGuard<'a, U>,
        timeout: Duration,
    ) -> MutexGuard<'a, U>;

    /// A state change made `signal` true for at least one waiter.
    fn notify(&self, signal: Signal);

    /// Wake every waiter of `signal` (close, cancellation).
    fn notify_all(&self, signal: Signal);
}

/// Two condition variables, one per predicate.
///
/// Enqueue wakes exactly one consumer and dequeue exactly one producer.
/// All waiters on a condition share the same predicate, so whichever one
/// is woken can use the change.
pub struct Conditions {
    not_full: Condvar,
    not_empty: Condvar,
}

impl Conditions {
    fn condvar(&self, signal: Signal) -> &Condvar {
        match signal {
            Signal::SpaceAvailable => &self.not_full,
            Signal::ItemAvailable => &self.not_empty,
        }
    }
}

impl Default for Conditions {
    fn default() -> Self {
        Self {
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }
}

impl WaitStrategy for Conditions {
    const NAME: &'static str = "conditions";

    fn wait<'a, U>(&self, signal: Signal, guard: MutexGuard<'a, U>) -> MutexGuard<'a, U> {
        sync::wait(self.condvar(signal), guard)
    }

    fn wait_timeout<'a, U>(
        &self,
        signal: Signal,
        guard: MutexGuard<'a, U>,
        timeout: Duration,
    ) -> MutexGuard<'a, U> {
        sync::wait_timeout(self.condvar(signal), guard, timeout)
    }

    fn notify(&self, signal: Signal) {
        self.condvar(signal).notify_one();
    }

    fn notify_all(&self, signal: Signal) {
        self.condvar(signal).notify_all();
    }
}

/// One wait set shared by producers and consumers, broadcast on every
/// change.
pub struct Monitor {
    changed: Condvar,
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            changed: Condvar::new(),
        }
    }
}

impl WaitStrategy for Monitor {
    const NAME: &'static str = "monitor";

    fn wait<'a, U>(&self, _signal: Signal, guard: MutexGuard<'a, U>) -> MutexGuard<'a, U> {
        sync::wait(&self.changed, guard)
    }

    fn wait_timeout<'a, U>(
        &self,
        _signal: Signal,
        guard: MutexGuard<'a, U>,
        timeout: Duration,
    ) -> MutexGuard<'a, U> {
        sync::wait_timeout(&self.changed, guard, timeout)
    }

    fn notify(&self, _signal: Signal) {
        // Wake-one here could pick a waiter of the wrong class.
        self.changed.notify_all();
    }

    fn notify_all(&self, _signal: Signal) {
        self.changed.notify_all();
    }
}
