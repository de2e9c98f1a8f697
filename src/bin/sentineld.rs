//! sentineld - presence surveillance daemon
//!
//! This daemon:
//! 1. Pulls frames from a tracker (the deterministic stub out of the box)
//! 2. Resolves configured regions against the first frame's detections
//! 3. Advances every target's presence state once per tick
//! 4. Dispatches snapshot, archive, and notification work when a target
//!    newly goes missing
//! 5. Logs a status line and prunes the alert archive on timers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use presence_sentinel::config::NotifierKind;
use presence_sentinel::notify::MqttNotifier;
use presence_sentinel::{
    resolve_targets, AlertDispatcher, BoundingBox, Detection, FilesystemSnapshotStore, Frame,
    LogNotifier, MonitoringSession, NotificationTransport, SentinelConfig, SqliteAlertStore,
    StatisticsAggregator, StubTracker, Tracker,
};

const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;
const STATUS_INTERVAL: Duration = Duration::from_secs(5);
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);
/// Detection metrics are sampled every Nth frame, not every tick.
const METRICS_SAMPLE_EVERY: u64 = 30;

fn main() -> Result<()> {
    // Initialize logging (simple stderr)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("sentineld {} starting", env!("CARGO_PKG_VERSION"));
    let cfg = SentinelConfig::load()?;
    let regions = cfg.regions()?;

    let stats = Arc::new(StatisticsAggregator::new());
    let snapshots = Arc::new(FilesystemSnapshotStore::new(&cfg.snapshot_dir));
    let notifier: Arc<dyn NotificationTransport> = match cfg.notifier_kind()? {
        NotifierKind::Log => Arc::new(LogNotifier),
        NotifierKind::Mqtt => Arc::new(MqttNotifier::connect(cfg.mqtt_notifier_config())?),
    };
    log::info!("notifier: {}", notifier.name());
    let archive = SqliteAlertStore::open(&cfg.db_path)
        .with_context(|| format!("failed to open alert archive {}", cfg.db_path))?;
    let mut dispatcher = AlertDispatcher::new(snapshots, notifier, stats.clone(), cfg.cooldown())
        .with_archive(Box::new(archive));

    let mut tracker = default_tracker();
    let mut session = MonitoringSession::new();

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .expect("error setting Ctrl-C handler");
    }

    log::info!(
        "station '{}', {} region(s), threshold {} frame(s), cooldown {}s",
        cfg.station_id,
        regions.len(),
        cfg.alert_threshold_frames,
        cfg.cooldown_seconds
    );
    log::info!("alert archive at {}", cfg.db_path);

    // The first frame binds regions to tracked identities. Zero targets is
    // fatal here: a daemon watching nothing only pretends to work.
    let mut seq = 0u64;
    let first = Frame::synthetic(FRAME_WIDTH, FRAME_HEIGHT, seq);
    seq += 1;
    let detections = tracker
        .track(&first)
        .with_context(|| format!("tracker '{}' failed on first frame", tracker.name()))?;
    let targets = resolve_targets(&regions, &detections, cfg.alert_threshold_frames)
        .context("target resolution failed")?;
    session.set_targets(targets);
    session.start();

    let mut last_status = Instant::now();
    let mut last_prune = Instant::now();
    let mut frames_since_fps = 0u32;
    let mut fps_window_start = Instant::now();

    while running.load(Ordering::SeqCst) {
        let frame = Frame::synthetic(FRAME_WIDTH, FRAME_HEIGHT, seq);
        seq += 1;

        let detections = match tracker.track(&frame) {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!("tracker '{}' failed: {}", tracker.name(), e);
                std::thread::sleep(cfg.tick_interval());
                continue;
            }
        };

        frames_since_fps += 1;
        let window = fps_window_start.elapsed();
        if window >= Duration::from_secs(1) {
            stats.record_fps(f64::from(frames_since_fps) / window.as_secs_f64());
            frames_since_fps = 0;
            fps_window_start = Instant::now();
        }
        if seq % METRICS_SAMPLE_EVERY == 0 {
            for detection in &detections {
                stats.record_detection_confidence(detection.confidence);
            }
            stats.record_objects_tracked(detections.len());
        }

        let result = session.tick(&detections);
        if !result.transitions.is_empty() {
            let outcome = dispatcher.dispatch(&result.transitions, &frame);
            if outcome.notifications_dropped > 0 {
                log::warn!(
                    "notification queue full, dropped {} alert(s)",
                    outcome.notifications_dropped
                );
            }
        }

        if last_status.elapsed() >= STATUS_INTERVAL {
            let status = session.status();
            let summary = stats.summary();
            log::info!(
                "status: monitoring={} targets={} alerts={} fps={:.1} notified={} failed={}",
                status.monitoring,
                status.target_count,
                status.total_alerts,
                summary.current_fps,
                summary.notifications_sent,
                summary.notification_failures
            );
            last_status = Instant::now();
        }

        if last_prune.elapsed() >= PRUNE_INTERVAL {
            dispatcher.prune_archive(cfg.retention());
            last_prune = Instant::now();
        }

        std::thread::sleep(cfg.tick_interval());
    }

    log::info!("shutting down, draining notifications");
    session.stop();
    if !dispatcher.wait_idle(Duration::from_secs(2)) {
        log::warn!(
            "{} notification(s) still in flight at shutdown",
            dispatcher.pending_notifications()
        );
    }
    let summary = stats.summary();
    log::info!(
        "final: {} alert(s) total, {} today, {} notified, {} failed, up {}s",
        summary.total_alerts,
        summary.alerts_today,
        summary.notifications_sent,
        summary.notification_failures,
        summary.uptime_s
    );
    Ok(())
}

/// Out-of-the-box tracker: one "package" (id 1) centered in the default
/// region, present for 80 ticks then missing for 40, forever. At the default
/// threshold that raises an alert roughly every 12 seconds of missing time.
fn default_tracker() -> StubTracker {
    let template = vec![
        Detection::new(BoundingBox::new(200.0, 150.0, 420.0, 330.0), 0.92)
            .with_label("package")
            .with_track_id(1),
    ];
    StubTracker::cycling(template, 80, 40)
}
