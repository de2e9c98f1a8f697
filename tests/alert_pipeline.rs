//! Dispatcher behavior under load, cooldown, and transport failure.

use std::sync::Arc;
use std::time::Duration;

use presence_sentinel::{
    AlertDispatcher, Frame, InMemoryAlertStore, InMemorySnapshotStore, RecordingNotifier,
    StatisticsAggregator, Transition,
};

fn transition(id: i64) -> Transition {
    Transition {
        label: "package".to_string(),
        track_id: id,
        region_index: 0,
    }
}

#[test]
fn slow_transport_overflows_queue_without_losing_accounting() {
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let notifier = Arc::new(RecordingNotifier::delayed(Duration::from_millis(50)));
    let stats = Arc::new(StatisticsAggregator::new());
    let mut dispatcher =
        AlertDispatcher::new(snapshots, notifier.clone(), stats.clone(), Duration::ZERO);

    // Far more distinct identities than the worker queue holds.
    let transitions: Vec<Transition> = (0..40).map(transition).collect();
    let frame = Frame::synthetic(32, 32, 0);
    let outcome = dispatcher.dispatch(&transitions, &frame);

    assert_eq!(outcome.notifications_suppressed, 0);
    assert!(outcome.notifications_dropped > 0, "queue should overflow");
    assert_eq!(
        outcome.notifications_requested + outcome.notifications_dropped,
        40
    );

    assert!(dispatcher.wait_idle(Duration::from_secs(5)));

    // Every accepted request was delivered; every drop was counted failed.
    assert_eq!(notifier.sent_count(), outcome.notifications_requested);
    let summary = stats.summary();
    assert_eq!(
        summary.notifications_sent,
        outcome.notifications_requested as u64
    );
    assert_eq!(
        summary.notification_failures,
        outcome.notifications_dropped as u64
    );
    // Overflow never loses the alert itself.
    assert_eq!(stats.total_alerts(), 40);
}

#[test]
fn cooldown_holds_across_dispatch_calls() {
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let stats = Arc::new(StatisticsAggregator::new());
    let mut dispatcher = AlertDispatcher::new(
        snapshots,
        notifier.clone(),
        stats.clone(),
        Duration::from_secs(300),
    )
    .with_archive(Box::new(InMemoryAlertStore::new()));

    let frame = Frame::synthetic(32, 32, 0);
    let first = dispatcher.dispatch(&[transition(3)], &frame);
    assert_eq!(first.notifications_requested, 1);
    assert!(dispatcher.wait_idle(Duration::from_secs(1)));

    let second = dispatcher.dispatch(&[transition(3)], &frame);
    assert_eq!(second.notifications_requested, 0);
    assert_eq!(second.notifications_suppressed, 1);

    // Suppression mutes the notification, not the record.
    assert_eq!(notifier.sent_count(), 1);
    assert_eq!(stats.total_alerts(), 2);
    let archive = dispatcher.archive().expect("archive attached");
    assert_eq!(archive.count().expect("count"), 2);
}

#[test]
fn transport_failure_counts_without_blocking_the_pipeline() {
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    notifier.set_failing(true);
    let stats = Arc::new(StatisticsAggregator::new());
    let mut dispatcher =
        AlertDispatcher::new(snapshots, notifier.clone(), stats.clone(), Duration::ZERO);

    let frame = Frame::synthetic(32, 32, 0);
    let outcome = dispatcher.dispatch(&[transition(5)], &frame);
    assert_eq!(outcome.notifications_requested, 1);
    assert!(dispatcher.wait_idle(Duration::from_secs(1)));

    assert_eq!(notifier.sent_count(), 0);
    let summary = stats.summary();
    assert_eq!(summary.notifications_sent, 0);
    assert_eq!(summary.notification_failures, 1);

    // The workers survive the failure; the next attempt is delivered.
    notifier.set_failing(false);
    let outcome = dispatcher.dispatch(&[transition(5)], &frame);
    assert_eq!(outcome.notifications_requested, 1);
    assert!(dispatcher.wait_idle(Duration::from_secs(1)));
    assert_eq!(notifier.sent_count(), 1);
}
