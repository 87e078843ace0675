//! Run the checker and report in `bq-core` terms.
//!
//! A violated `always` property comes back as a `PropertyResult` carrying
//! a [`Counterexample`] rebuilt by replaying the discovered path.

use bq_core::{Counterexample, PropertyResult, StateSnapshot, SyncIssue, ThreadAction};
use stateright::{Checker, Model};

use crate::model::{ModelConfig, QueueAction, QueueModel, QueueState, Role, ThreadStatus};

const SOURCE: &str = "queue_model";

/// Properties that must hold in every reachable state.
pub const ALWAYS: [&str; 3] = ["bounded capacity", "fifo", "no deadlock"];

/// Properties that must hold in some reachable state.
pub const SOMETIMES: [&str; 1] = ["all delivered"];

/// Outcome of exhaustively checking one configuration.
#[derive(Debug, Clone)]
pub struct ModelReport {
    pub config: ModelConfig,
    pub unique_states: usize,
    pub complete: bool,
    pub properties: Vec<PropertyResult>,
}

impl ModelReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.complete && self.properties.iter().all(|p| p.holds)
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyResult> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Explore every reachable state of `config` (BFS).
#[must_use]
pub fn check(config: ModelConfig) -> ModelReport {
    let model = QueueModel::new(config.clone());
    let checker = QueueModel::new(config.clone()).checker().spawn_bfs().join();

    let mut properties = Vec::new();
    for (line, &name) in ALWAYS.iter().enumerate() {
        let line = line as u32 + 1;
        properties.push(match checker.discovery(name) {
            None => PropertyResult::pass(name, SOURCE, line),
            Some(path) => {
                let counterexample = replay(&model, &path.into_actions());
                PropertyResult::fail(
                    name,
                    SOURCE,
                    line,
                    format!("violated after {} steps", counterexample.interleaving.len()),
                    Some(counterexample),
                )
            }
        });
    }
    for (i, &name) in SOMETIMES.iter().enumerate() {
        let line = (ALWAYS.len() + i) as u32 + 1;
        properties.push(match checker.discovery(name) {
            Some(_) => PropertyResult::pass(name, SOURCE, line),
            None => PropertyResult::fail(name, SOURCE, line, "no reachable witness".to_string(), None),
        });
    }

    ModelReport {
        config,
        unique_states: checker.unique_state_count(),
        complete: checker.is_done(),
        properties,
    }
}

/// Replay `actions` from the initial state into a rendered failure path.
#[must_use]
pub fn replay(model: &QueueModel, actions: &[QueueAction]) -> Counterexample {
    let mut counterexample = Counterexample::new().with_description(format!(
        "{:?}: {} producer(s) x {} item(s), {} consumer(s), capacity {}",
        model.config.signaling,
        model.config.producers,
        model.config.items_per_producer,
        model.config.consumers,
        model.config.capacity
    ));
    let Some(mut state) = model.init_states().into_iter().next() else {
        return counterexample;
    };
    counterexample.add_state(snapshot(&state, 0));

    for (i, &action) in actions.iter().enumerate() {
        let step = i as u64 + 1;
        let Some(next) = model.next_state(&state, action) else {
            break;
        };
        counterexample.add_action(describe(model, &state, &next, action, step));

        if let QueueAction::Complete { wake: Some(woken), .. } = action {
            let role = next.threads[woken].role;
            if !model.can_proceed(&next, role) {
                let starved = next.waiting_threads().into_iter().find(|&t| {
                    model.can_proceed(&next, next.threads[t].role)
                });
                if let Some(starved) = starved {
                    counterexample.add_sync_issue(SyncIssue::LostWakeup {
                        woken_thread: woken as u64,
                        starved_thread: starved as u64,
                        step,
                    });
                }
            }
        }

        counterexample.add_state(snapshot(&next, step));
        state = next;
    }

    if !state.all_done() && !state.any_running() {
        counterexample.add_sync_issue(SyncIssue::Deadlock {
            waiting_threads: state.waiting_threads().into_iter().map(|t| t as u64).collect(),
            step: actions.len() as u64,
        });
    }
    counterexample
}

fn describe(
    model: &QueueModel,
    before: &QueueState,
    after: &QueueState,
    action: QueueAction,
    step: u64,
) -> ThreadAction {
    let thread = action.thread();
    let role = before.threads[thread].role;
    let (text, success) = match (action, role) {
        (QueueAction::Block { .. }, Role::Producer) => ("enqueue()".to_string(), false),
        (QueueAction::Block { .. }, Role::Consumer) => ("dequeue()".to_string(), false),
        (QueueAction::Complete { wake, .. }, _) => {
            let op = match role {
                Role::Producer => format!("enqueue({})", after.enqueued.last().copied().unwrap_or(0)),
                Role::Consumer => format!("dequeue() -> {}", after.delivered.last().copied().unwrap_or(0)),
            };
            let notify = match (model.config.signaling, wake) {
                (crate::Signaling::Broadcast, _) => " notify_all".to_string(),
                (_, Some(w)) => format!(" wake T{}", w),
                (_, None) => String::new(),
            };
            (op + &notify, true)
        }
    };
    ThreadAction {
        thread_id: thread as u64,
        step,
        action: text,
        success,
    }
}

fn snapshot(state: &QueueState, step: u64) -> StateSnapshot {
    let status = |s: ThreadStatus| match s {
        ThreadStatus::Running => "run".to_string(),
        ThreadStatus::Waiting(set) => format!("wait:{:?}", set),
        ThreadStatus::Done => "done".to_string(),
    };
    let buffer = format!("{:?}", state.buffer);
    let threads = state
        .threads
        .iter()
        .enumerate()
        .map(|(id, t)| format!("T{}={}", id, status(t.status)))
        .collect::<Vec<_>>()
        .join(" ");
    StateSnapshot {
        step,
        description: format!("buffer={} {}", buffer, threads),
        variables: vec![("buffer".to_string(), buffer), ("threads".to_string(), threads)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Signaling;

    #[test]
    fn test_replay_reports_lost_wakeup_and_deadlock() {
        let model = QueueModel::new(ModelConfig::lost_wakeup(Signaling::SingleWaitSetNotifyOne));
        let actions = [
            QueueAction::Block { thread: 1 },
            QueueAction::Block { thread: 2 },
            QueueAction::Complete { thread: 0, wake: Some(1) },
            QueueAction::Block { thread: 0 },
            QueueAction::Complete { thread: 1, wake: Some(2) },
            QueueAction::Block { thread: 2 },
        ];
        let counterexample = replay(&model, &actions);

        assert_eq!(counterexample.interleaving.len(), 6);
        assert_eq!(counterexample.states.len(), 7);
        assert!(counterexample.sync_issues.contains(&SyncIssue::LostWakeup {
            woken_thread: 2,
            starved_thread: 0,
            step: 5,
        }));
        assert!(counterexample.sync_issues.contains(&SyncIssue::Deadlock {
            waiting_threads: vec![0, 2],
            step: 6,
        }));
        let diagram = counterexample.render_diagram();
        assert!(diagram.contains("dequeue() -> 0 wake T2"), "{}", diagram);
        assert!(diagram.contains("buffer=[] T0=wait:Shared T1=done T2=wait:Shared"), "{}", diagram);
    }
}
