//! Bounded queue wait/notify state machine.
//!
//! One step is one trip through the queue lock: a runnable thread either
//! completes its operation (and notifies) or finds its predicate false and
//! goes to sleep. Waking a thread only makes it runnable; it re-checks its
//! predicate on its next step, as the real queue does.
//!
//! # Signalings
//!
//! | Signaling | Wait sets | On success |
//! |-----------|-----------|------------|
//! | `TwoConditions` | `NotFull`, `NotEmpty` | wake one waiter of the other set |
//! | `Broadcast` | one shared | wake every waiter |
//! | `SingleWaitSetNotifyOne` | one shared | wake one waiter of either class |
//!
//! Wake-one picks its waiter nondeterministically: each choice is a
//! separate action, so the checker explores all of them.
//!
//! # Properties
//!
//! 1. `bounded capacity` (always): the buffer never exceeds capacity
//! 2. `fifo` (always): dequeued items followed by the buffer equal the
//!    enqueue order
//! 3. `no deadlock` (always): some thread can run unless all are done
//! 4. `all delivered` (sometimes): every item reaches a consumer

use std::collections::VecDeque;

use stateright::{Model, Property};

/// Thread index within the model.
pub type ThreadId = usize;

/// Condition-variable scheme under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signaling {
    TwoConditions,
    Broadcast,
    /// Single wait set with wake-one: can wake the wrong class.
    SingleWaitSetNotifyOne,
}

/// Which wait set a sleeping thread is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WaitSet {
    NotFull,
    NotEmpty,
    Shared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Producer,
    Consumer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadStatus {
    Running,
    Waiting(WaitSet),
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadState {
    pub role: Role,
    pub status: ThreadStatus,
    /// Operations completed so far
    pub completed: u64,
    /// Operations this thread performs in total
    pub quota: u64,
}

/// Model checking configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub producers: usize,
    pub consumers: usize,
    pub items_per_producer: u64,
    pub capacity: usize,
    pub signaling: Signaling,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            producers: 2,
            consumers: 2,
            items_per_producer: 2,
            capacity: 1,
            signaling: Signaling::TwoConditions,
        }
    }
}

impl ModelConfig {
    /// Smallest configuration where wake-one on a single wait set stalls:
    /// one producer with two items, two consumers, one slot.
    #[must_use]
    pub fn lost_wakeup(signaling: Signaling) -> Self {
        Self {
            producers: 1,
            consumers: 2,
            items_per_producer: 2,
            capacity: 1,
            signaling,
        }
    }

    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.producers as u64 * self.items_per_producer
    }

    fn consumer_quota(&self, index: usize) -> u64 {
        let consumers = self.consumers as u64;
        let total = self.total_items();
        total / consumers + u64::from((index as u64) < total % consumers)
    }
}

/// Model state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueState {
    pub buffer: VecDeque<u64>,
    pub threads: Vec<ThreadState>,
    /// Items in enqueue order
    pub enqueued: Vec<u64>,
    /// Items in dequeue order
    pub delivered: Vec<u64>,
}

impl QueueState {
    #[must_use]
    pub fn all_done(&self) -> bool {
        self.threads.iter().all(|t| t.status == ThreadStatus::Done)
    }

    #[must_use]
    pub fn any_running(&self) -> bool {
        self.threads.iter().any(|t| t.status == ThreadStatus::Running)
    }

    /// Threads asleep in any wait set.
    #[must_use]
    pub fn waiting_threads(&self) -> Vec<ThreadId> {
        self.threads
            .iter()
            .enumerate()
            .filter(|(_, t)| matches!(t.status, ThreadStatus::Waiting(_)))
            .map(|(id, _)| id)
            .collect()
    }

    fn waiters_in(&self, set: WaitSet) -> Vec<ThreadId> {
        self.threads
            .iter()
            .enumerate()
            .filter(|(_, t)| t.status == ThreadStatus::Waiting(set))
            .map(|(id, _)| id)
            .collect()
    }
}

/// A thread takes the lock and runs one attempt of its operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueAction {
    /// Predicate false: sleep in the thread's wait set.
    Block { thread: ThreadId },
    /// Operation completes. `wake` is the waiter chosen by a wake-one
    /// notify; broadcast wakes every waiter and leaves it `None`.
    Complete { thread: ThreadId, wake: Option<ThreadId> },
}

impl QueueAction {
    #[must_use]
    pub fn thread(&self) -> ThreadId {
        match *self {
            QueueAction::Block { thread } | QueueAction::Complete { thread, .. } => thread,
        }
    }
}

/// Stateright model of the queue protocol.
#[derive(Debug, Clone)]
pub struct QueueModel {
    pub config: ModelConfig,
}

impl QueueModel {
    /// # Panics
    ///
    /// If the capacity is zero or there are no producers or consumers.
    #[must_use]
    pub fn new(config: ModelConfig) -> Self {
        assert!(config.capacity > 0, "capacity must be positive");
        assert!(config.producers > 0 && config.consumers > 0, "need producers and consumers");
        Self { config }
    }

    fn wait_set(&self, role: Role) -> WaitSet {
        match (self.config.signaling, role) {
            (Signaling::TwoConditions, Role::Producer) => WaitSet::NotFull,
            (Signaling::TwoConditions, Role::Consumer) => WaitSet::NotEmpty,
            (Signaling::Broadcast | Signaling::SingleWaitSetNotifyOne, _) => WaitSet::Shared,
        }
    }

    /// The set notified after `role` completes an operation.
    fn notified_set(&self, role: Role) -> WaitSet {
        match (self.config.signaling, role) {
            (Signaling::TwoConditions, Role::Producer) => WaitSet::NotEmpty,
            (Signaling::TwoConditions, Role::Consumer) => WaitSet::NotFull,
            (Signaling::Broadcast | Signaling::SingleWaitSetNotifyOne, _) => WaitSet::Shared,
        }
    }

    pub(crate) fn can_proceed(&self, state: &QueueState, role: Role) -> bool {
        match role {
            Role::Producer => state.buffer.len() < self.config.capacity,
            Role::Consumer => !state.buffer.is_empty(),
        }
    }

    /// Value of the next item `thread` (a producer) enqueues.
    fn next_item(&self, thread: ThreadId, state: &QueueState) -> u64 {
        thread as u64 * self.config.items_per_producer + state.threads[thread].completed
    }
}

impl Model for QueueModel {
    type State = QueueState;
    type Action = QueueAction;

    fn init_states(&self) -> Vec<Self::State> {
        let producers = (0..self.config.producers).map(|_| ThreadState {
            role: Role::Producer,
            status: ThreadStatus::Running,
            completed: 0,
            quota: self.config.items_per_producer,
        });
        let consumers = (0..self.config.consumers).map(|i| ThreadState {
            role: Role::Consumer,
            status: ThreadStatus::Running,
            completed: 0,
            quota: self.config.consumer_quota(i),
        });
        let threads = producers
            .chain(consumers)
            .map(|mut t| {
                if t.quota == 0 {
                    t.status = ThreadStatus::Done;
                }
                t
            })
            .collect();

        vec![QueueState {
            buffer: VecDeque::new(),
            threads,
            enqueued: Vec::new(),
            delivered: Vec::new(),
        }]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        for (thread, t) in state.threads.iter().enumerate() {
            if t.status != ThreadStatus::Running {
                continue;
            }
            if !self.can_proceed(state, t.role) {
                actions.push(QueueAction::Block { thread });
                continue;
            }
            let waiters = state.waiters_in(self.notified_set(t.role));
            if self.config.signaling == Signaling::Broadcast || waiters.is_empty() {
                actions.push(QueueAction::Complete { thread, wake: None });
            } else {
                for waiter in waiters {
                    actions.push(QueueAction::Complete {
                        thread,
                        wake: Some(waiter),
                    });
                }
            }
        }
    }

    fn next_state(&self, last_state: &Self::State, action: Self::Action) -> Option<Self::State> {
        let mut state = last_state.clone();
        match action {
            QueueAction::Block { thread } => {
                let set = self.wait_set(state.threads[thread].role);
                state.threads[thread].status = ThreadStatus::Waiting(set);
            }
            QueueAction::Complete { thread, wake } => {
                let role = state.threads[thread].role;
                match role {
                    Role::Producer => {
                        let item = self.next_item(thread, &state);
                        state.buffer.push_back(item);
                        state.enqueued.push(item);
                    }
                    Role::Consumer => {
                        let item = state.buffer.pop_front()?;
                        state.delivered.push(item);
                    }
                }

                let notified = self.notified_set(role);
                if self.config.signaling == Signaling::Broadcast {
                    for waiter in state.waiters_in(notified) {
                        state.threads[waiter].status = ThreadStatus::Running;
                    }
                } else if let Some(waiter) = wake {
                    state.threads[waiter].status = ThreadStatus::Running;
                }

                let t = &mut state.threads[thread];
                t.completed += 1;
                if t.completed >= t.quota {
                    t.status = ThreadStatus::Done;
                }
            }
        }
        Some(state)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            Property::<Self>::always("bounded capacity", |model, state| {
                state.buffer.len() <= model.config.capacity
            }),
            Property::<Self>::always("fifo", |_, state| {
                state.enqueued.len() == state.delivered.len() + state.buffer.len()
                    && state.enqueued.iter().eq(state.delivered.iter().chain(state.buffer.iter()))
            }),
            Property::<Self>::always("no deadlock", |_, state| {
                state.all_done() || state.any_running()
            }),
            Property::<Self>::sometimes("all delivered", |model, state| {
                state.all_done() && state.delivered.len() as u64 == model.config.total_items()
            }),
        ]
    }
}
