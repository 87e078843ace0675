//! Counterexample representation and rendering.
//!
//! When a property violation is detected, a counterexample shows
//! the sequence of queue operations that led to the failure.

use std::fmt;

/// A counterexample showing the failure path.
///
/// Contains the state snapshots and thread actions that led to a
/// violation. Can be rendered as a per-thread diagram.
#[derive(Debug, Clone)]
pub struct Counterexample {
    /// Sequence of state snapshots
    pub states: Vec<StateSnapshot>,
    /// Thread interleaving that caused the failure
    pub interleaving: Vec<ThreadAction>,
    /// Synchronization issues detected
    pub sync_issues: Vec<SyncIssue>,
    /// DST seed for reproduction (if applicable)
    pub dst_seed: Option<u64>,
    /// Human-readable description of the failure
    pub description: Option<String>,
}

/// Snapshot of queue state at a point in time.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    /// Step number in the execution
    pub step: u64,
    /// Description of the state
    pub description: String,
    /// Variable values at this point
    pub variables: Vec<(String, String)>,
}

/// Action taken by a thread.
#[derive(Debug, Clone)]
pub struct ThreadAction {
    /// Thread identifier
    pub thread_id: u64,
    /// Step number when this action occurred
    pub step: u64,
    /// Description of the action
    pub action: String,
    /// Whether the action completed (false: the thread went to sleep)
    pub success: bool,
}

/// Synchronization problem found on a failure path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncIssue {
    /// A wakeup went to a waiter whose predicate was still false
    /// while an eligible waiter stayed asleep.
    LostWakeup {
        woken_thread: u64,
        starved_thread: u64,
        step: u64,
    },
    /// Every unfinished thread is asleep.
    Deadlock { waiting_threads: Vec<u64>, step: u64 },
    /// The queue held more items than its capacity.
    CapacityExceeded { len: u64, capacity: u64, step: u64 },
}

impl Counterexample {
    /// Create a new empty counterexample.
    #[must_use]
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            interleaving: Vec::new(),
            sync_issues: Vec::new(),
            dst_seed: None,
            description: None,
        }
    }

    /// Create a counterexample with DST seed for reproduction.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        Self {
            dst_seed: Some(seed),
            ..Self::new()
        }
    }

    /// Set the description for this counterexample.
    #[must_use]
    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }

    /// Add a state snapshot. Steps must be strictly increasing.
    pub fn add_state(&mut self, state: StateSnapshot) {
        debug_assert!(
            self.states.last().map_or(true, |last| state.step > last.step),
            "States must be added in order"
        );
        self.states.push(state);
    }

    /// Add a thread action.
    pub fn add_action(&mut self, action: ThreadAction) {
        self.interleaving.push(action);
    }

    /// Add a synchronization issue.
    pub fn add_sync_issue(&mut self, issue: SyncIssue) {
        self.sync_issues.push(issue);
    }

    /// Render the counterexample as a per-thread diagram.
    ///
    /// ```text
    /// DST_SEED=12345
    ///
    /// Step | Thread 0 | Thread 1 | State
    /// -----|----------|----------|------
    ///    1 | dequeue() [WAIT] |  | len=0
    ///    2 |          | enqueue(7) | len=1
    /// ```
    #[must_use]
    pub fn render_diagram(&self) -> String {
        let mut output = String::new();

        if let Some(seed) = self.dst_seed {
            output.push_str(&format!("DST_SEED={}\n\n", seed));
        }

        if let Some(ref desc) = self.description {
            output.push_str("Failure: ");
            output.push_str(desc);
            output.push_str("\n\n");
        }

        let mut threads: Vec<u64> = self.interleaving.iter().map(|a| a.thread_id).collect();
        threads.sort_unstable();
        threads.dedup();

        if threads.is_empty() {
            output.push_str("(no thread actions recorded)\n");
            return output;
        }

        output.push_str("Step |");
        for tid in &threads {
            output.push_str(&format!(" Thread {} |", tid));
        }
        output.push_str(" State\n");

        output.push_str("-----|");
        for _ in &threads {
            output.push_str("----------|");
        }
        output.push_str("------\n");

        let max_step = self.interleaving.iter().map(|a| a.step).max().unwrap_or(0);

        for step in 1..=max_step {
            output.push_str(&format!("{:4} |", step));

            for tid in &threads {
                let action = self
                    .interleaving
                    .iter()
                    .find(|a| a.step == step && a.thread_id == *tid);

                match action {
                    Some(a) => {
                        let status = if a.success { "" } else { " [WAIT]" };
                        output.push_str(&format!(" {}{} |", a.action, status));
                    }
                    None => output.push_str("          |"),
                }
            }

            if let Some(state) = self.states.iter().find(|s| s.step == step) {
                output.push_str(&format!(" {}", state.description));
            }

            output.push('\n');
        }

        if !self.sync_issues.is_empty() {
            output.push_str("\nSynchronization Issues:\n");
            for issue in &self.sync_issues {
                output.push_str(&format!("  - {}\n", issue));
            }
        }

        output
    }
}

impl Default for Counterexample {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncIssue::LostWakeup {
                woken_thread,
                starved_thread,
                step,
            } => write!(
                f,
                "Lost wakeup: thread {} was woken at step {} but thread {} was the eligible waiter",
                woken_thread, step, starved_thread
            ),
            SyncIssue::Deadlock {
                waiting_threads,
                step,
            } => write!(
                f,
                "Deadlock: threads {:?} all waiting at step {}",
                waiting_threads, step
            ),
            SyncIssue::CapacityExceeded {
                len,
                capacity,
                step,
            } => write!(
                f,
                "Capacity exceeded: {} items with capacity {} at step {}",
                len, capacity, step
            ),
        }
    }
}
