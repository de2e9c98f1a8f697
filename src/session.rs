//! Monitoring session: owns targets and turns per-frame detections into
//! level and edge alert information.
//!
//! The tick path is deliberately single-threaded and synchronous. One caller
//! drives `tick`; everything asynchronous (notification delivery) happens
//! behind [`crate::dispatch::AlertDispatcher`], never here.

use std::collections::HashSet;

use crate::detect::Detection;
use crate::presence::{PresenceState, PresenceTracker};
use crate::Region;

/// One region bound to one tracker identity.
#[derive(Debug, PartialEq)]
pub struct Target {
    pub region: Region,
    /// 0-based position of `region` in the list submitted at setup. Stable
    /// even when sibling regions failed to resolve.
    pub region_index: usize,
    pub track_id: i64,
    pub label: String,
    presence: PresenceTracker,
    alert_active: bool,
}

impl Target {
    pub fn new(
        region: Region,
        region_index: usize,
        track_id: i64,
        label: String,
        alert_threshold: u32,
    ) -> Self {
        Self {
            region,
            region_index,
            track_id,
            label,
            presence: PresenceTracker::new(alert_threshold),
            alert_active: false,
        }
    }

    pub fn state(&self) -> PresenceState {
        self.presence.state()
    }

    pub fn missing_frames(&self) -> u32 {
        self.presence.missing_frames()
    }

    /// True from the tick that raised an alert until the tick that saw the
    /// target again.
    pub fn alert_active(&self) -> bool {
        self.alert_active
    }
}

/// One target's SECURED→ALERT edge, as reported by [`MonitoringSession::tick`].
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub label: String,
    pub track_id: i64,
    pub region_index: usize,
}

/// What one tick observed.
///
/// `any_alert` is level (true while any target sits in ALERT); `transitions`
/// is edge (only targets that entered ALERT on this very tick). Consumers
/// that fire side effects key off `transitions`.
#[derive(Debug, Default)]
pub struct TickResult {
    pub any_alert: bool,
    pub transitions: Vec<Transition>,
}

/// Point-in-time session report.
#[derive(Clone, Debug)]
pub struct SessionStatus {
    pub monitoring: bool,
    pub target_count: usize,
    pub total_alerts: u64,
    pub alert_active: bool,
    pub targets: Vec<TargetStatus>,
}

#[derive(Clone, Debug)]
pub struct TargetStatus {
    pub label: String,
    pub track_id: i64,
    pub state: PresenceState,
}

/// Owns the resolved targets and the monotonic alert counter.
#[derive(Default)]
pub struct MonitoringSession {
    targets: Vec<Target>,
    total_alerts: u64,
    active: bool,
}

impl MonitoringSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs freshly resolved targets. Presence state starts over.
    pub fn set_targets(&mut self, targets: Vec<Target>) {
        log::info!("session: {} target(s) installed", targets.len());
        self.targets = targets;
    }

    /// Arms the tick loop. Refused while no targets are installed.
    pub fn start(&mut self) {
        if self.targets.is_empty() {
            log::warn!("session: start requested with no targets, ignoring");
            return;
        }
        self.active = true;
        log::info!(
            "session: monitoring started ({} target(s))",
            self.targets.len()
        );
    }

    pub fn stop(&mut self) {
        self.active = false;
        log::info!("session: monitoring stopped");
    }

    pub fn is_monitoring(&self) -> bool {
        self.active
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Total SECURED→ALERT transitions observed over the session lifetime.
    /// Deliberately survives [`MonitoringSession::reset`].
    pub fn total_alerts(&self) -> u64 {
        self.total_alerts
    }

    /// Feeds one frame's detections to every target.
    ///
    /// A target counts as present when any detection carries its bound
    /// identity; geometry is not re-checked after setup. No-op (default
    /// result) while stopped or without targets.
    pub fn tick(&mut self, detections: &[Detection]) -> TickResult {
        if !self.active || self.targets.is_empty() {
            return TickResult::default();
        }

        let present_ids: HashSet<i64> = detections.iter().filter_map(|d| d.track_id).collect();

        let mut result = TickResult::default();
        for target in &mut self.targets {
            let present = present_ids.contains(&target.track_id);
            match target.presence.update(present) {
                PresenceState::Alert => {
                    result.any_alert = true;
                    if !target.alert_active {
                        target.alert_active = true;
                        log::warn!(
                            "session: '{}' (id {}) missing past threshold in region {}",
                            target.label,
                            target.track_id,
                            target.region_index + 1
                        );
                        result.transitions.push(Transition {
                            label: target.label.clone(),
                            track_id: target.track_id,
                            region_index: target.region_index,
                        });
                    }
                }
                PresenceState::Secured => {
                    if target.alert_active {
                        target.alert_active = false;
                        log::info!(
                            "session: '{}' (id {}) present again in region {}",
                            target.label,
                            target.track_id,
                            target.region_index + 1
                        );
                    }
                }
                PresenceState::Initializing => {}
            }
        }

        self.total_alerts += result.transitions.len() as u64;
        result
    }

    /// Discards all targets and stops monitoring. Subsequent ticks are
    /// no-ops until targets are resolved and installed again.
    pub fn reset(&mut self) {
        self.targets.clear();
        self.active = false;
        log::info!("session: tracking reset, targets cleared");
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            monitoring: self.active,
            target_count: self.targets.len(),
            total_alerts: self.total_alerts,
            alert_active: self.targets.iter().any(|t| t.alert_active),
            targets: self
                .targets
                .iter()
                .map(|t| TargetStatus {
                    label: t.label.clone(),
                    track_id: t.track_id,
                    state: t.state(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn target(region_index: usize, track_id: i64, threshold: u32) -> Target {
        Target::new(
            Region::new(0.0, 0.0, 100.0, 100.0).unwrap(),
            region_index,
            track_id,
            format!("object-{track_id}"),
            threshold,
        )
    }

    fn seen(ids: &[i64]) -> Vec<Detection> {
        ids.iter()
            .map(|id| {
                Detection::new(BoundingBox::new(10.0, 10.0, 50.0, 50.0), 0.9).with_track_id(*id)
            })
            .collect()
    }

    fn armed(targets: Vec<Target>) -> MonitoringSession {
        let mut session = MonitoringSession::new();
        session.set_targets(targets);
        session.start();
        session
    }

    #[test]
    fn transition_fires_exactly_once() {
        let mut session = armed(vec![target(0, 7, 2)]);
        session.tick(&seen(&[7]));

        assert!(session.tick(&seen(&[])).transitions.is_empty());
        assert!(session.tick(&seen(&[])).transitions.is_empty());

        let result = session.tick(&seen(&[]));
        assert_eq!(result.transitions.len(), 1);
        assert_eq!(result.transitions[0].track_id, 7);
        assert!(result.any_alert);

        // Still alerting, but the edge already fired.
        let result = session.tick(&seen(&[]));
        assert!(result.any_alert);
        assert!(result.transitions.is_empty());
    }

    #[test]
    fn recovery_is_silent_and_rearms() {
        let mut session = armed(vec![target(0, 7, 1)]);
        session.tick(&seen(&[7]));
        session.tick(&seen(&[]));
        let result = session.tick(&seen(&[]));
        assert_eq!(result.transitions.len(), 1);

        let result = session.tick(&seen(&[7]));
        assert!(!result.any_alert);
        assert!(result.transitions.is_empty());
        assert!(!session.targets()[0].alert_active());

        // Disappearing again produces a fresh transition.
        session.tick(&seen(&[]));
        let result = session.tick(&seen(&[]));
        assert_eq!(result.transitions.len(), 1);
        assert_eq!(session.total_alerts(), 2);
    }

    #[test]
    fn only_missing_target_transitions() {
        let mut session = armed(vec![target(0, 7, 3), target(1, 9, 3)]);
        session.tick(&seen(&[7, 9]));

        let mut transitions = Vec::new();
        for _ in 0..4 {
            transitions.extend(session.tick(&seen(&[7])).transitions);
        }
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].track_id, 9);
        assert_eq!(transitions[0].region_index, 1);
        assert_eq!(session.status().targets[0].state, PresenceState::Secured);
    }

    #[test]
    fn unconfirmed_target_never_alerts() {
        // Identity 9 is never sighted after setup, so it stays INITIALIZING.
        let mut session = armed(vec![target(0, 9, 1)]);
        for _ in 0..50 {
            let result = session.tick(&seen(&[]));
            assert!(!result.any_alert);
            assert!(result.transitions.is_empty());
        }
        assert_eq!(
            session.status().targets[0].state,
            PresenceState::Initializing
        );
    }

    #[test]
    fn tick_before_start_is_noop() {
        let mut session = MonitoringSession::new();
        session.set_targets(vec![target(0, 7, 1)]);
        for _ in 0..10 {
            let result = session.tick(&seen(&[]));
            assert!(result.transitions.is_empty());
            assert!(!result.any_alert);
        }
        assert_eq!(session.status().targets[0].state, PresenceState::Initializing);
    }

    #[test]
    fn start_without_targets_is_refused() {
        let mut session = MonitoringSession::new();
        session.start();
        assert!(!session.is_monitoring());
    }

    #[test]
    fn reset_discards_targets_and_keeps_counter() {
        let mut session = armed(vec![target(0, 7, 1)]);
        session.tick(&seen(&[7]));
        session.tick(&seen(&[]));
        session.tick(&seen(&[]));
        assert_eq!(session.total_alerts(), 1);

        session.reset();
        assert!(!session.is_monitoring());
        assert_eq!(session.status().target_count, 0);
        assert_eq!(session.total_alerts(), 1);

        // Ticking after reset observes nothing.
        let result = session.tick(&seen(&[7]));
        assert!(result.transitions.is_empty());
        assert!(!result.any_alert);
    }

    #[test]
    fn stop_takes_effect_before_next_tick() {
        let mut session = armed(vec![target(0, 7, 0)]);
        session.tick(&seen(&[7]));
        session.stop();
        let result = session.tick(&seen(&[]));
        assert!(result.transitions.is_empty());
    }

    #[test]
    fn status_reflects_alert_latch() {
        let mut session = armed(vec![target(0, 7, 0)]);
        session.tick(&seen(&[7]));
        assert!(!session.status().alert_active);
        session.tick(&seen(&[]));
        let status = session.status();
        assert!(status.alert_active);
        assert!(status.monitoring);
        assert_eq!(status.total_alerts, 1);
        assert_eq!(status.targets[0].state, PresenceState::Alert);
    }
}
