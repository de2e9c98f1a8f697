//! Outbound alert notification boundary.
//!
//! Transports run on the dispatcher's worker threads, never on the tick
//! path. A transport that fails affects exactly one thing: the notification
//! outcome counters. Presence state and the alert archive never see it.

pub mod mqtt;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};

pub use mqtt::{MqttNotifier, MqttNotifierConfig};

/// One target's disappearance, ready for delivery.
#[derive(Clone, Debug, PartialEq)]
pub struct AlertNotification {
    pub label: String,
    pub track_id: i64,
    /// 0-based region position; [`AlertNotification::headline`] renders it
    /// 1-based for humans.
    pub region_index: usize,
    pub snapshot: Option<String>,
    pub epoch_s: u64,
}

impl AlertNotification {
    /// Human-facing one-liner, used by log transports and message subjects.
    pub fn headline(&self) -> String {
        format!(
            "ALERT: {} (id {}) missing from region {}",
            self.label,
            self.track_id,
            self.region_index + 1
        )
    }
}

pub trait NotificationTransport: Send + Sync {
    /// Short transport name for logs.
    fn name(&self) -> &'static str;

    /// Delivers one notification. Blocking is fine; callers invoke this off
    /// the tick path.
    fn send(&self, notification: &AlertNotification) -> Result<()>;
}

/// Transport that only writes a log line. The default for bare setups and
/// the fallback recommendation when no broker is reachable.
#[derive(Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl NotificationTransport for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send(&self, notification: &AlertNotification) -> Result<()> {
        match &notification.snapshot {
            Some(snapshot) => {
                log::info!("{} [snapshot {}]", notification.headline(), snapshot)
            }
            None => log::info!("{}", notification.headline()),
        }
        Ok(())
    }
}

/// Test transport: records deliveries, optionally fails or delays them.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<AlertNotification>>,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each delivery sleeps for `delay` first, to exercise in-flight
    /// behavior.
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<AlertNotification> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl NotificationTransport for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn send(&self, notification: &AlertNotification) -> Result<()> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("recording notifier is set to fail"));
        }
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification() -> AlertNotification {
        AlertNotification {
            label: "bicycle".to_string(),
            track_id: 7,
            region_index: 0,
            snapshot: Some("output/alerts/alert_1755000000000.jpg".to_string()),
            epoch_s: 1_755_000_000,
        }
    }

    #[test]
    fn headline_renders_one_based_region() {
        assert_eq!(
            notification().headline(),
            "ALERT: bicycle (id 7) missing from region 1"
        );
    }

    #[test]
    fn log_notifier_always_succeeds() {
        let transport = LogNotifier::new();
        assert!(transport.send(&notification()).is_ok());
    }

    #[test]
    fn recording_notifier_records_and_fails_on_demand() {
        let transport = RecordingNotifier::new();
        transport.send(&notification()).unwrap();
        assert_eq!(transport.sent_count(), 1);
        assert_eq!(transport.sent()[0].track_id, 7);

        transport.set_failing(true);
        assert!(transport.send(&notification()).is_err());
        assert_eq!(transport.sent_count(), 1);
    }
}
