//! Bounded blocking FIFO queue.
//!
//! # Protocol
//!
//! Every operation takes the single queue lock, checks its predicate, and
//! either completes or sleeps on the [`WaitStrategy`]. Predicates are
//! re-checked after every wake, so spurious and stale wakeups are
//! harmless. A completed enqueue signals `ItemAvailable`, a completed
//! dequeue signals `SpaceAvailable`.
//!
//! A waiter that leaves early (timeout, cancellation) only does so while
//! its predicate is false, so it never swallows a wakeup another waiter of
//! the same class could have used.
//!
//! # Example
//!
//! ```
//! use bq_queue::BoundedQueue;
//!
//! let queue: BoundedQueue<&str> = BoundedQueue::new(2).unwrap();
//! queue.enqueue("a").unwrap();
//! queue.enqueue("b").unwrap();
//! assert_eq!(queue.len(), 2);
//! assert_eq!(queue.dequeue().unwrap(), "a");
//! assert_eq!(queue.snapshot().collect::<Vec<_>>(), vec!["b"]);
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::cancel::{CancelToken, WakeHook};
use crate::error::{EnqueueError, QueueError};
use crate::ring::Ring;
use crate::snapshot::Snapshot;
use crate::strategy::{Conditions, Monitor, Signal, WaitStrategy};
use crate::sync::{self, Arc, Mutex, MutexGuard};

/// Lock-protected queue state.
struct State<T> {
    ring: Ring<T>,
    closed: bool,
    /// Linearization stamp, bumped by every completed operation.
    stamp: u64,
    /// Callers currently inside a condition wait.
    sleepers: usize,
}

struct Shared<T, S> {
    state: Mutex<State<T>>,
    strategy: S,
}

impl<T, S: WaitStrategy> Shared<T, S> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        sync::lock(&self.state)
    }
}

/// How long an operation may sleep.
#[derive(Clone, Copy)]
pub(crate) enum Wait<'t> {
    /// Fail immediately instead of sleeping.
    Never,
    Forever,
    Until(Instant),
    Cancellable(&'t CancelToken),
}

impl Wait<'_> {
    fn timeout(timeout: Duration) -> Self {
        // Overflowing deadlines (e.g. Duration::MAX) mean "no deadline".
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Wait::Until(deadline),
            None => Wait::Forever,
        }
    }
}

/// Outcome of a wait step: re-check the predicate, or give up.
enum Slept<'a, T> {
    Again(MutexGuard<'a, State<T>>),
    GaveUp(MutexGuard<'a, State<T>>, QueueError),
}

/// Bounded, thread-safe FIFO queue over a fixed ring buffer.
///
/// Cloning yields another handle to the same queue. The buffer is freed
/// when the last handle is dropped; a blocked caller holds a handle, so a
/// queue can never disappear under a waiter.
///
/// `S` selects the condition-variable scheme, [`Conditions`] by default.
pub struct BoundedQueue<T, S: WaitStrategy = Conditions> {
    shared: Arc<Shared<T, S>>,
    capacity: usize,
}

/// Queue using two condition variables.
pub type ConditionQueue<T> = BoundedQueue<T, Conditions>;

/// Queue using one broadcast wait set.
pub type MonitorQueue<T> = BoundedQueue<T, Monitor>;

impl<T, S: WaitStrategy> BoundedQueue<T, S> {
    /// Create a queue holding at most `capacity` items.
    ///
    /// # Errors
    ///
    /// `QueueError::InvalidArgument` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidArgument("capacity must be positive"));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    ring: Ring::with_capacity(capacity),
                    closed: false,
                    stamp: 0,
                    sleepers: 0,
                }),
                strategy: S::default(),
            }),
            capacity,
        })
    }

    /// Enqueue, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// `Closed` if the queue is (or becomes) closed; the item is returned.
    pub fn enqueue(&self, item: T) -> Result<(), EnqueueError<T>> {
        self.enqueue_with(item, Wait::Forever).map(|_| ())
    }

    /// Dequeue the oldest item, waiting while the queue is empty.
    ///
    /// # Errors
    ///
    /// `NoSuchElement` once the queue is closed and drained.
    pub fn dequeue(&self) -> Result<T, QueueError> {
        self.dequeue_with(Wait::Forever).1
    }

    /// Enqueue without waiting.
    ///
    /// # Errors
    ///
    /// `Full` or `Closed`, with the item returned.
    pub fn try_enqueue(&self, item: T) -> Result<(), EnqueueError<T>> {
        self.enqueue_with(item, Wait::Never).map(|_| ())
    }

    /// Dequeue without waiting.
    ///
    /// # Errors
    ///
    /// `Empty`, or `NoSuchElement` if closed and drained.
    pub fn try_dequeue(&self) -> Result<T, QueueError> {
        self.dequeue_with(Wait::Never).1
    }

    /// Enqueue, waiting at most `timeout` for space.
    ///
    /// # Errors
    ///
    /// `Timeout` or `Closed`, with the item returned.
    pub fn enqueue_timeout(&self, item: T, timeout: Duration) -> Result<(), EnqueueError<T>> {
        self.enqueue_with(item, Wait::timeout(timeout)).map(|_| ())
    }

    /// Dequeue, waiting at most `timeout` for an item.
    ///
    /// # Errors
    ///
    /// `Timeout`, or `NoSuchElement` if closed and drained.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Result<T, QueueError> {
        self.dequeue_with(Wait::timeout(timeout)).1
    }

    /// Close the queue. Blocked and future enqueues fail with `Closed`;
    /// dequeues drain what is left and then fail with `NoSuchElement`.
    ///
    /// Returns `false` if the queue was already closed.
    pub fn close(&self) -> bool {
        let mut state = self.shared.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        self.shared.strategy.notify_all(Signal::SpaceAvailable);
        self.shared.strategy.notify_all(Signal::ItemAvailable);
        debug!(remaining = state.ring.len(), "queue closed");
        true
    }

    /// Whether [`BoundedQueue::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Number of queued items. Advisory: may be stale as soon as it
    /// returns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.lock().ring.len()
    }

    /// Alias for [`BoundedQueue::len`].
    #[must_use]
    pub fn size(&self) -> usize {
        self.len()
    }

    /// Whether the queue held no items at the instant of the call.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.lock().ring.is_empty()
    }

    /// Whether the queue was at capacity at the instant of the call.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.shared.lock().ring.is_full()
    }

    /// Fixed maximum number of items.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Name of the wait strategy.
    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        S::NAME
    }

    /// Copy of the contents, oldest first, taken in one critical section.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<T>
    where
        T: Clone,
    {
        let state = self.shared.lock();
        Snapshot::new(state.ring.iter().cloned().collect())
    }

    /// Run the full ring invariant check under the lock. Panics on an
    /// illegal state.
    pub fn check_invariants(&self) {
        self.shared.lock().ring.check_invariants();
    }

    /// Enqueue and return the linearization stamp of the operation.
    pub(crate) fn enqueue_with(&self, item: T, wait: Wait<'_>) -> Result<u64, EnqueueError<T>> {
        let mut state = self.shared.lock();
        loop {
            if state.closed {
                return Err(EnqueueError::new(item, QueueError::Closed));
            }
            if !state.ring.is_full() {
                break;
            }
            trace!(capacity = self.capacity, "enqueue waiting for space");
            state = match self.sleep(state, Signal::SpaceAvailable, wait) {
                Slept::Again(state) => state,
                Slept::GaveUp(_, reason) => return Err(EnqueueError::new(item, reason)),
            };
        }

        state.ring.push_back(item);
        state.stamp += 1;
        let stamp = state.stamp;
        self.shared.strategy.notify(Signal::ItemAvailable);
        Ok(stamp)
    }

    /// Dequeue and return the linearization stamp with the result.
    ///
    /// An `Empty` observation also gets a stamp so a non-blocking
    /// dequeue can be placed in the history; other errors return the
    /// current stamp unchanged.
    pub(crate) fn dequeue_with(&self, wait: Wait<'_>) -> (u64, Result<T, QueueError>) {
        let mut state = self.shared.lock();
        loop {
            if !state.ring.is_empty() {
                break;
            }
            if state.closed {
                return (state.stamp, Err(QueueError::NoSuchElement));
            }
            if matches!(wait, Wait::Never) {
                state.stamp += 1;
                return (state.stamp, Err(QueueError::Empty));
            }
            trace!("dequeue waiting for an item");
            state = match self.sleep(state, Signal::ItemAvailable, wait) {
                Slept::Again(state) => state,
                Slept::GaveUp(state, reason) => return (state.stamp, Err(reason)),
            };
        }

        let Some(item) = state.ring.pop_front() else {
            panic!("illegal state: non-empty ring returned no item");
        };
        state.stamp += 1;
        let stamp = state.stamp;
        self.shared.strategy.notify(Signal::SpaceAvailable);
        (stamp, Ok(item))
    }

    /// One wait step for a caller whose predicate is false.
    fn sleep<'a>(
        &'a self,
        state: MutexGuard<'a, State<T>>,
        signal: Signal,
        wait: Wait<'_>,
    ) -> Slept<'a, T> {
        let strategy = &self.shared.strategy;
        match wait {
            Wait::Never => {
                let reason = match signal {
                    Signal::SpaceAvailable => QueueError::Full,
                    Signal::ItemAvailable => QueueError::Empty,
                };
                Slept::GaveUp(state, reason)
            }
            Wait::Forever => Slept::Again(Self::park(state, |s| strategy.wait(signal, s))),
            Wait::Until(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    debug!(?signal, "wait timed out");
                    return Slept::GaveUp(state, QueueError::Timeout);
                }
                Slept::Again(Self::park(state, |s| {
                    strategy.wait_timeout(signal, s, deadline - now)
                }))
            }
            Wait::Cancellable(token) => {
                if token.is_cancelled() {
                    debug!(?signal, "wait interrupted");
                    return Slept::GaveUp(state, QueueError::Interrupted);
                }
                Slept::Again(Self::park(state, |s| strategy.wait(signal, s)))
            }
        }
    }

    /// Count the caller as a sleeper for the duration of `wait`.
    fn park<'a>(
        mut state: MutexGuard<'a, State<T>>,
        wait: impl FnOnce(MutexGuard<'a, State<T>>) -> MutexGuard<'a, State<T>>,
    ) -> MutexGuard<'a, State<T>> {
        state.sleepers += 1;
        let mut state = wait(state);
        state.sleepers -= 1;
        state
    }
}

/// Wakes every waiter of one signal on one queue.
struct QueueWakeHook<T, S> {
    shared: Arc<Shared<T, S>>,
    signal: Signal,
}

impl<T: Send, S: WaitStrategy> WakeHook for QueueWakeHook<T, S> {
    fn wake(&self) {
        // Holding the lock orders this wake after the waiter's flag check.
        let _state = self.shared.lock();
        self.shared.strategy.notify_all(self.signal);
    }
}

impl<T: Send + 'static, S: WaitStrategy> BoundedQueue<T, S> {
    /// Enqueue, waiting while full until `token` is cancelled.
    ///
    /// # Errors
    ///
    /// `Interrupted` if cancelled while waiting, `Closed` if closed; the
    /// item is returned and the queue is unchanged.
    pub fn enqueue_cancellable(&self, item: T, token: &CancelToken) -> Result<(), EnqueueError<T>> {
        let _registration = token.register(self.wake_hook(Signal::SpaceAvailable));
        self.enqueue_with(item, Wait::Cancellable(token)).map(|_| ())
    }

    /// Dequeue, waiting while empty until `token` is cancelled.
    ///
    /// # Errors
    ///
    /// `Interrupted` if cancelled while waiting, `NoSuchElement` if closed
    /// and drained.
    pub fn dequeue_cancellable(&self, token: &CancelToken) -> Result<T, QueueError> {
        let _registration = token.register(self.wake_hook(Signal::ItemAvailable));
        self.dequeue_with(Wait::Cancellable(token)).1
    }

    fn wake_hook(&self, signal: Signal) -> std::sync::Arc<dyn WakeHook> {
        std::sync::Arc::new(QueueWakeHook {
            shared: Arc::clone(&self.shared),
            signal,
        })
    }
}

impl<T, S: WaitStrategy> Clone for BoundedQueue<T, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            capacity: self.capacity,
        }
    }
}

impl<T, S: WaitStrategy> fmt::Debug for BoundedQueue<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("BoundedQueue")
            .field("strategy", &S::NAME)
            .field("capacity", &self.capacity)
            .field("len", &state.ring.len())
            .field("closed", &state.closed)
            .field("sleepers", &state.sleepers)
            .finish()
    }
}


#[cfg(loom)]
mod loom_tests {
    use super::*;
    use loom::thread;

    #[test]
    fn test_producer_consumer_hand_off() {
        loom::model(|| {
            let queue: BoundedQueue<u32> = BoundedQueue::new(1).unwrap();
            let producer = {
                let queue = queue.clone();
                thread::spawn(move || {
                    queue.enqueue(1).unwrap();
                    queue.enqueue(2).unwrap();
                })
            };

            assert_eq!(queue.dequeue(), Ok(1));
            assert_eq!(queue.dequeue(), Ok(2));
            producer.join().unwrap();
            queue.check_invariants();
        });
    }

    #[test]
    fn test_no_lost_wakeup_with_two_consumers() {
        fn run<S: WaitStrategy>() {
            loom::model(|| {
                let queue: BoundedQueue<u32, S> = BoundedQueue::new(1).unwrap();
                let consumers: Vec<_> = (0..2)
                    .map(|_| {
                        let queue = queue.clone();
                        thread::spawn(move || queue.dequeue().unwrap())
                    })
                    .collect();

                queue.enqueue(1).unwrap();
                queue.enqueue(2).unwrap();

                let mut got: Vec<u32> = consumers.into_iter().map(|h| h.join().unwrap()).collect();
                got.sort_unstable();
                assert_eq!(got, vec![1, 2]);
                assert!(queue.is_empty());
            });
        }
        run::<Conditions>();
        run::<Monitor>();
    }

    #[test]
    fn test_close_releases_blocked_producer() {
        loom::model(|| {
            let queue: BoundedQueue<u32> = BoundedQueue::new(1).unwrap();
            queue.enqueue(1).unwrap();
            let producer = {
                let queue = queue.clone();
                thread::spawn(move || queue.enqueue(2).map_err(|e| e.reason()))
            };

            queue.close();
            assert_eq!(producer.join().unwrap(), Err(QueueError::Closed));
            assert_eq!(queue.dequeue(), Ok(1));
            assert_eq!(queue.dequeue(), Err(QueueError::NoSuchElement));
        });
    }

    #[test]
    fn test_cancel_never_strands_a_waiter() {
        loom::model(|| {
            let queue: BoundedQueue<u32> = BoundedQueue::new(1).unwrap();
            let token = CancelToken::new();
            let consumer = {
                let queue = queue.clone();
                let token = token.clone();
                thread::spawn(move || queue.dequeue_cancellable(&token))
            };

            token.cancel();
            assert_eq!(consumer.join().unwrap(), Err(QueueError::Interrupted));
        });
    }
}
