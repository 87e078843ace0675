//! Exhaustive checks of the wait/notify protocol.

use bq_core::SyncIssue;
use bq_stateright::{ModelConfig, QueueModel, Signaling, check};
use stateright::{Checker, Model};

#[test]
fn test_two_conditions_satisfy_all_properties() {
    for config in [
        ModelConfig::default(),
        ModelConfig::lost_wakeup(Signaling::TwoConditions),
        ModelConfig {
            producers: 2,
            consumers: 1,
            items_per_producer: 2,
            capacity: 2,
            signaling: Signaling::TwoConditions,
        },
    ] {
        QueueModel::new(config).checker().spawn_bfs().join().assert_properties();
    }
}

#[test]
fn test_broadcast_satisfies_all_properties() {
    for config in [
        ModelConfig {
            signaling: Signaling::Broadcast,
            ..ModelConfig::default()
        },
        ModelConfig::lost_wakeup(Signaling::Broadcast),
    ] {
        let report = check(config);
        assert!(report.passed(), "{:#?}", report.properties);
        assert!(report.unique_states > 1);
    }
}

#[test]
fn test_single_wait_set_notify_one_deadlocks() {
    let checker = QueueModel::new(ModelConfig::lost_wakeup(Signaling::SingleWaitSetNotifyOne))
        .checker()
        .spawn_bfs()
        .join();
    assert!(checker.discovery("no deadlock").is_some());
    // The safety properties still hold; only progress is lost.
    assert!(checker.discovery("bounded capacity").is_none());
    assert!(checker.discovery("fifo").is_none());
}

#[test]
fn test_deadlock_report_carries_counterexample() {
    let report = check(ModelConfig::lost_wakeup(Signaling::SingleWaitSetNotifyOne));
    assert!(!report.passed());

    let deadlock = report.property("no deadlock").expect("property is reported");
    assert!(!deadlock.holds);
    let counterexample = deadlock.counterexample.as_ref().expect("path is attached");
    assert!(counterexample
        .sync_issues
        .iter()
        .any(|issue| matches!(issue, SyncIssue::Deadlock { .. })));
    assert!(counterexample
        .sync_issues
        .iter()
        .any(|issue| matches!(issue, SyncIssue::LostWakeup { .. })));
    assert!(counterexample.render_diagram().contains("Synchronization Issues"));

    // Progress is still possible on other paths.
    assert!(report.property("all delivered").is_some_and(|p| p.holds));
}

#[test]
fn test_model_actions_are_deterministic() {
    let model = QueueModel::new(ModelConfig::default());
    let init = model.init_states().remove(0);
    let mut first = Vec::new();
    let mut second = Vec::new();
    model.actions(&init, &mut first);
    model.actions(&init, &mut second);
    assert_eq!(first, second);
    assert_eq!(first.len(), 4);
}
