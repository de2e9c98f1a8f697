//! End-to-end lifecycle runs through resolution and the monitoring session.

use presence_sentinel::{
    resolve_targets, BoundingBox, Detection, MonitoringSession, PresenceState, Region,
};

fn detection(id: i64, label: &str, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
    Detection::new(BoundingBox::new(x1, y1, x2, y2), 0.9)
        .with_label(label)
        .with_track_id(id)
}

#[test]
fn alert_fires_only_after_threshold_is_exceeded() {
    let regions = vec![Region::new(0.0, 0.0, 100.0, 100.0).expect("region")];
    let package = detection(3, "package", 10.0, 10.0, 50.0, 50.0);

    let targets = resolve_targets(&regions, &[package.clone()], 25).expect("resolve");
    let mut session = MonitoringSession::new();
    session.set_targets(targets);
    session.start();

    // First sighting confirms the target.
    let result = session.tick(&[package.clone()]);
    assert!(!result.any_alert);

    // 25 missing frames are tolerated at threshold 25.
    for _ in 0..25 {
        let result = session.tick(&[]);
        assert!(!result.any_alert);
        assert!(result.transitions.is_empty());
    }

    // The 26th missing frame crosses the threshold.
    let result = session.tick(&[]);
    assert!(result.any_alert);
    assert_eq!(result.transitions.len(), 1);
    assert_eq!(result.transitions[0].track_id, 3);
    assert_eq!(session.total_alerts(), 1);

    // The transition is edge-triggered; staying missing does not repeat it.
    let result = session.tick(&[]);
    assert!(result.any_alert);
    assert!(result.transitions.is_empty());
    assert_eq!(session.total_alerts(), 1);
}

#[test]
fn only_the_missing_target_alerts() {
    let regions = vec![
        Region::new(0.0, 0.0, 100.0, 100.0).expect("region a"),
        Region::new(200.0, 0.0, 300.0, 100.0).expect("region b"),
    ];
    let package = detection(7, "package", 10.0, 10.0, 60.0, 60.0);
    let bicycle = detection(9, "bicycle", 210.0, 10.0, 260.0, 60.0);
    let both = vec![package.clone(), bicycle.clone()];

    let targets = resolve_targets(&regions, &both, 2).expect("resolve");
    assert_eq!(targets.len(), 2);

    let mut session = MonitoringSession::new();
    session.set_targets(targets);
    session.start();
    session.tick(&both);

    // Only the bicycle goes missing.
    let only_package = vec![package.clone()];
    session.tick(&only_package);
    session.tick(&only_package);
    let result = session.tick(&only_package);

    assert_eq!(result.transitions.len(), 1);
    let transition = &result.transitions[0];
    assert_eq!(transition.label, "bicycle");
    assert_eq!(transition.track_id, 9);
    assert_eq!(transition.region_index, 1);

    let status = session.status();
    assert_eq!(status.targets[0].state, PresenceState::Secured);
    assert_eq!(status.targets[1].state, PresenceState::Alert);
}

#[test]
fn region_binds_to_the_overlapping_detection() {
    let regions = vec![Region::new(0.0, 0.0, 100.0, 100.0).expect("region")];
    let inside = detection(3, "package", 10.0, 10.0, 50.0, 50.0);
    let outside = detection(4, "bicycle", 200.0, 200.0, 210.0, 210.0);

    let targets = resolve_targets(&regions, &[inside, outside], 5).expect("resolve");

    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].track_id, 3);
    assert_eq!(targets[0].label, "package");
    assert_eq!(targets[0].region_index, 0);
}

#[test]
fn recovery_is_silent_and_rearms_the_alert() {
    let regions = vec![Region::new(0.0, 0.0, 100.0, 100.0).expect("region")];
    let package = detection(3, "package", 10.0, 10.0, 50.0, 50.0);
    let present = vec![package.clone()];

    let targets = resolve_targets(&regions, &present, 1).expect("resolve");
    let mut session = MonitoringSession::new();
    session.set_targets(targets);
    session.start();
    session.tick(&present);

    session.tick(&[]);
    let result = session.tick(&[]);
    assert_eq!(result.transitions.len(), 1);

    // Recovery produces no transition of its own.
    let result = session.tick(&present);
    assert!(!result.any_alert);
    assert!(result.transitions.is_empty());
    assert_eq!(session.total_alerts(), 1);

    // And the next absence alerts again.
    session.tick(&[]);
    let result = session.tick(&[]);
    assert_eq!(result.transitions.len(), 1);
    assert_eq!(session.total_alerts(), 2);
}

#[test]
fn reset_keeps_the_running_alert_total() {
    let regions = vec![Region::new(0.0, 0.0, 100.0, 100.0).expect("region")];
    let package = detection(3, "package", 10.0, 10.0, 50.0, 50.0);
    let present = vec![package.clone()];

    let targets = resolve_targets(&regions, &present, 1).expect("resolve");
    let mut session = MonitoringSession::new();
    session.set_targets(targets);
    session.start();
    session.tick(&present);
    session.tick(&[]);
    session.tick(&[]);
    assert_eq!(session.total_alerts(), 1);

    session.reset();
    assert!(!session.is_monitoring());
    assert!(session.targets().is_empty());
    assert_eq!(session.total_alerts(), 1);

    // A fresh watch keeps counting from where it left off.
    let bicycle = detection(9, "bicycle", 20.0, 20.0, 70.0, 70.0);
    let present = vec![bicycle.clone()];
    let targets = resolve_targets(&regions, &present, 1).expect("resolve");
    session.set_targets(targets);
    session.start();
    session.tick(&present);
    session.tick(&[]);
    let result = session.tick(&[]);
    assert_eq!(result.transitions.len(), 1);
    assert_eq!(session.total_alerts(), 2);
}
