//! Alert side-effect pipeline.
//!
//! One dispatcher sits between the session and the outside world. For each
//! transition-producing tick it saves a single snapshot shared by the whole
//! batch, appends archive and statistics records synchronously, and hands
//! notification requests to a small worker pool behind a bounded queue. The
//! tick path never waits on a transport; a wedged broker costs queue slots,
//! not frames.
//!
//! Workers share exactly two things with the rest of the system: the
//! per-identity cooldown map and the statistics aggregator. Session state is
//! out of their reach, so requests that outlive a `reset()` stay harmless.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crate::frame::Frame;
use crate::notify::{AlertNotification, NotificationTransport};
use crate::session::Transition;
use crate::snapshot::SnapshotStore;
use crate::stats::StatisticsAggregator;
use crate::storage::AlertStore;
use crate::{now_s, AlertRecord};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

const NOTIFY_WORKERS: usize = 2;
const NOTIFY_QUEUE_DEPTH: usize = 32;

/// What one dispatch call did, for callers and tests.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Reference of the snapshot shared by this batch, if one was saved.
    pub snapshot: Option<String>,
    /// Set when the snapshot store failed; the rest of the pipeline ran on.
    pub snapshot_error: Option<String>,
    pub archive_errors: usize,
    pub notifications_requested: usize,
    /// Requests withheld by the per-identity cooldown.
    pub notifications_suppressed: usize,
    /// Requests lost to a full worker queue, counted as failed attempts.
    pub notifications_dropped: usize,
}

pub struct AlertDispatcher {
    snapshots: Arc<dyn SnapshotStore>,
    archive: Option<Box<dyn AlertStore>>,
    stats: Arc<StatisticsAggregator>,
    cooldown: Duration,
    last_notified: Arc<Mutex<HashMap<i64, Instant>>>,
    queue: SyncSender<AlertNotification>,
    in_flight: Arc<AtomicUsize>,
}

impl AlertDispatcher {
    /// Builds the dispatcher and spawns its notification workers. Workers
    /// live until the dispatcher is dropped and its queue drains.
    pub fn new(
        snapshots: Arc<dyn SnapshotStore>,
        notifier: Arc<dyn NotificationTransport>,
        stats: Arc<StatisticsAggregator>,
        cooldown: Duration,
    ) -> Self {
        let (queue, rx) = mpsc::sync_channel::<AlertNotification>(NOTIFY_QUEUE_DEPTH);
        let rx = Arc::new(Mutex::new(rx));
        let last_notified = Arc::new(Mutex::new(HashMap::new()));
        let in_flight = Arc::new(AtomicUsize::new(0));

        for _ in 0..NOTIFY_WORKERS {
            spawn_notify_worker(
                Arc::clone(&rx),
                Arc::clone(&notifier),
                Arc::clone(&stats),
                Arc::clone(&last_notified),
                Arc::clone(&in_flight),
            );
        }

        Self {
            snapshots,
            archive: None,
            stats,
            cooldown,
            last_notified,
            queue,
            in_flight,
        }
    }

    /// Attaches a durable alert archive; without one, alerts live only in
    /// the aggregator.
    pub fn with_archive(mut self, archive: Box<dyn AlertStore>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn archive(&self) -> Option<&dyn AlertStore> {
        self.archive.as_deref()
    }

    /// Runs the side-effect pipeline for one tick's transitions.
    ///
    /// At most one snapshot is saved per call and its reference is shared by
    /// every record and notification in the batch. Archive and snapshot
    /// failures are logged and reflected in the outcome but never propagate;
    /// the cooldown decision happens here, synchronously, so suppression is
    /// deterministic for the caller.
    pub fn dispatch(&mut self, transitions: &[Transition], frame: &Frame) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        if transitions.is_empty() {
            return outcome;
        }

        let epoch_s = now_s().unwrap_or(0);
        match self.snapshots.save(frame) {
            Ok(reference) => outcome.snapshot = Some(reference),
            Err(e) => {
                log::error!("dispatch: snapshot failed: {e:#}");
                outcome.snapshot_error = Some(format!("{e:#}"));
            }
        }

        for transition in transitions {
            let record = AlertRecord {
                epoch_s,
                label: transition.label.clone(),
                track_id: transition.track_id,
                region_index: transition.region_index,
                snapshot: outcome.snapshot.clone(),
            };
            self.stats.record_alert(record.clone());
            if let Some(archive) = &mut self.archive {
                if let Err(e) = archive.append(&record) {
                    log::error!("dispatch: alert archive append failed: {e:#}");
                    outcome.archive_errors += 1;
                }
            }

            let suppressed = {
                let last = lock_unpoisoned(&self.last_notified);
                matches!(
                    last.get(&transition.track_id),
                    Some(at) if at.elapsed() < self.cooldown
                )
            };
            if suppressed {
                log::info!(
                    "dispatch: notification for id {} suppressed (cooldown)",
                    transition.track_id
                );
                outcome.notifications_suppressed += 1;
                continue;
            }

            let notification = AlertNotification {
                label: transition.label.clone(),
                track_id: transition.track_id,
                region_index: transition.region_index,
                snapshot: outcome.snapshot.clone(),
                epoch_s,
            };
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            match self.queue.try_send(notification) {
                Ok(()) => {
                    lock_unpoisoned(&self.last_notified)
                        .insert(transition.track_id, Instant::now());
                    outcome.notifications_requested += 1;
                }
                Err(TrySendError::Full(n)) => {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    log::warn!(
                        "dispatch: notification queue full, dropping request for id {}",
                        n.track_id
                    );
                    self.stats.record_notification(false);
                    outcome.notifications_dropped += 1;
                }
                Err(TrySendError::Disconnected(n)) => {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    log::error!(
                        "dispatch: notification workers gone, dropping request for id {}",
                        n.track_id
                    );
                    self.stats.record_notification(false);
                    outcome.notifications_dropped += 1;
                }
            }
        }

        outcome
    }

    /// Notification requests accepted but not yet resolved.
    pub fn pending_notifications(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Waits until the workers finish everything in flight, up to `timeout`.
    /// Used on shutdown and by tests; the tick path never calls this.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        while self.pending_notifications() > 0 {
            if start.elapsed() > timeout {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
        true
    }

    /// Applies the archive retention policy, if an archive is attached.
    pub fn prune_archive(&mut self, retention: Duration) {
        if let Some(archive) = &mut self.archive {
            if let Err(e) = archive.prune_older_than(retention) {
                log::error!("dispatch: archive prune failed: {e:#}");
            }
        }
    }
}

fn lock_unpoisoned<'a>(
    map: &'a Mutex<HashMap<i64, Instant>>,
) -> MutexGuard<'a, HashMap<i64, Instant>> {
    // Cooldown data stays valid even if a holder panicked.
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn spawn_notify_worker(
    rx: Arc<Mutex<Receiver<AlertNotification>>>,
    notifier: Arc<dyn NotificationTransport>,
    stats: Arc<StatisticsAggregator>,
    last_notified: Arc<Mutex<HashMap<i64, Instant>>>,
    in_flight: Arc<AtomicUsize>,
) {
    thread::spawn(move || loop {
        let job = {
            let guard = rx
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.recv()
        };
        let Ok(notification) = job else {
            // Queue closed: dispatcher dropped and backlog drained.
            break;
        };

        match notifier.send(&notification) {
            Ok(()) => {
                stats.record_notification(true);
                lock_unpoisoned(&last_notified).insert(notification.track_id, Instant::now());
            }
            Err(e) => {
                log::warn!(
                    "notify: {} delivery failed for id {}: {e:#}",
                    notifier.name(),
                    notification.track_id
                );
                stats.record_notification(false);
            }
        }
        in_flight.fetch_sub(1, Ordering::SeqCst);
    });
}
