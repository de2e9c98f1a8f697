//! demo - end-to-end scripted run of the presence pipeline
//!
//! Binds two regions to tracked objects, walks one object through a missing
//! spell long enough to alert, then brings it back. Everything is scripted,
//! so the output is the same on every run.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use presence_sentinel::{
    resolve_targets, AlertDispatcher, BoundingBox, Detection, FilesystemSnapshotStore, Frame,
    LogNotifier, MonitoringSession, Region, SqliteAlertStore, StatisticsAggregator, StubTracker,
    Tracker,
};

const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Consecutive missing frames tolerated before an alert.
    #[arg(long, default_value_t = 3)]
    threshold: u32,
    /// Output directory for snapshots and the demo archive.
    #[arg(long, default_value = "demo_out")]
    out: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.threshold == 0 {
        return Err(anyhow!("threshold must be >= 1"));
    }

    let out_dir = PathBuf::from(&args.out);
    fs::create_dir_all(&out_dir)?;
    let db_path = out_dir.join("demo_sentinel.db");
    let snapshot_dir = out_dir.join("snapshots");

    stage("configure scripted tracker");
    let package = Detection::new(BoundingBox::new(60.0, 60.0, 180.0, 180.0), 0.94)
        .with_label("package")
        .with_track_id(3);
    let bicycle = Detection::new(BoundingBox::new(320.0, 120.0, 480.0, 280.0), 0.88)
        .with_label("bicycle")
        .with_track_id(9);
    let both = vec![package.clone(), bicycle.clone()];
    let only_bicycle = vec![bicycle.clone()];

    // Frame 0 binds targets, frame 1 confirms them, then the package goes
    // missing just past the threshold and finally comes back.
    let mut script = vec![both.clone(), both.clone()];
    for _ in 0..=args.threshold {
        script.push(only_bicycle.clone());
    }
    script.push(both.clone());
    script.push(both.clone());
    let total_frames = script.len();
    let mut tracker = StubTracker::scripted(script);

    let regions = vec![
        Region::new(40.0, 40.0, 200.0, 200.0)?,
        Region::new(300.0, 100.0, 500.0, 300.0)?,
    ];

    stage("resolve targets on first frame");
    let mut seq = 0u64;
    let first = Frame::synthetic(FRAME_WIDTH, FRAME_HEIGHT, seq);
    seq += 1;
    let detections = tracker.track(&first)?;
    let targets = resolve_targets(&regions, &detections, args.threshold)
        .context("target resolution failed")?;
    for target in &targets {
        eprintln!(
            "demo:   region {} bound to '{}' (id {})",
            target.region_index + 1,
            target.label,
            target.track_id
        );
    }

    let stats = Arc::new(StatisticsAggregator::new());
    let snapshots = Arc::new(FilesystemSnapshotStore::new(&snapshot_dir));
    let archive = SqliteAlertStore::open(&db_path.to_string_lossy())?;

    let mut session = MonitoringSession::new();
    session.set_targets(targets);
    session.start();

    // Zero cooldown so nothing in the walkthrough is suppressed.
    let mut dispatcher =
        AlertDispatcher::new(snapshots, Arc::new(LogNotifier), stats.clone(), Duration::ZERO)
            .with_archive(Box::new(archive));

    stage("run scripted frames");
    let mut was_alerting = false;
    for _ in 1..total_frames {
        let frame = Frame::synthetic(FRAME_WIDTH, FRAME_HEIGHT, seq);
        seq += 1;
        let detections = tracker.track(&frame)?;
        for detection in &detections {
            stats.record_detection_confidence(detection.confidence);
        }
        stats.record_objects_tracked(detections.len());

        let result = session.tick(&detections);
        if !result.transitions.is_empty() {
            for transition in &result.transitions {
                eprintln!(
                    "demo:   ALERT '{}' (id {}) missing from region {}",
                    transition.label,
                    transition.track_id,
                    transition.region_index + 1
                );
            }
            let outcome = dispatcher.dispatch(&result.transitions, &frame);
            if let Some(path) = &outcome.snapshot {
                eprintln!("demo:   snapshot {}", path);
            }
            if let Some(err) = &outcome.snapshot_error {
                eprintln!("demo:   snapshot failed: {}", err);
            }
        }

        let alerting = session.status().alert_active;
        if was_alerting && !alerting {
            eprintln!("demo:   all targets present again");
        }
        was_alerting = alerting;
    }

    stage("drain notifications");
    if !dispatcher.wait_idle(Duration::from_secs(1)) {
        eprintln!(
            "demo:   {} notification(s) still pending",
            dispatcher.pending_notifications()
        );
    }

    let summary = stats.summary();
    let archived = match dispatcher.archive() {
        Some(store) => store.count()?,
        None => 0,
    };

    println!("demo summary:");
    println!("  frames processed: {}", total_frames);
    println!("  targets bound: {}", session.targets().len());
    println!("  alerts raised: {}", session.total_alerts());
    println!("  notifications sent: {}", summary.notifications_sent);
    println!("  notification failures: {}", summary.notification_failures);
    println!("  alerts archived: {}", archived);
    println!("  archive db: {}", db_path.display());
    println!("  snapshot dir: {}", snapshot_dir.display());
    println!("next steps:");
    println!("  cargo run --bin sentineld");
    println!(
        "  cargo run --bin export_alerts -- --db-path {}",
        db_path.display()
    );
    Ok(())
}

fn stage(msg: &str) {
    eprintln!("demo: {}", msg);
}
