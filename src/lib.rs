//! Presence surveillance core.
//!
//! Watches user-designated regions of a video stream and decides, frame by
//! frame, whether the object bound to each region is still there. Detection
//! and tracking are external concerns behind the [`detect::Tracker`] seam;
//! this crate owns the debounced per-target state machine, the alert
//! lifecycle, and the side-effect pipeline that fires when a target goes
//! missing.
//!
//! Pipeline:
//!
//! 1. Setup: [`resolve::resolve_targets`] binds each region to the tracker
//!    identity whose detection best overlaps it on a reference frame.
//! 2. Every frame: [`session::MonitoringSession::tick`] updates each target
//!    and reports level (`any_alert`) and edge (`transitions`) information.
//! 3. On transitions: [`dispatch::AlertDispatcher`] persists one snapshot for
//!    the whole batch, records statistics, and hands rate-limited
//!    notifications to a bounded worker pool.
//!
//! Properties the rest of the code leans on:
//!
//! - A target alerts only after strictly more than the configured number of
//!   consecutive missing frames; a single sighting rearms it.
//! - Each disappearance produces exactly one transition; recovery is silent.
//! - Notification transports never run on the tick path and cannot affect
//!   presence state.
//! - A per-identity cooldown bounds the outbound notification rate.

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};

pub mod config;
pub mod detect;
pub mod dispatch;
pub mod frame;
pub mod notify;
pub mod presence;
pub mod resolve;
pub mod session;
pub mod snapshot;
pub mod stats;
pub mod storage;

pub use config::SentinelConfig;
pub use detect::{BoundingBox, Detection, StubTracker, Tracker};
pub use dispatch::{AlertDispatcher, DispatchOutcome};
pub use frame::Frame;
pub use notify::{AlertNotification, LogNotifier, NotificationTransport, RecordingNotifier};
pub use presence::{PresenceState, PresenceTracker};
pub use resolve::{resolve_targets, ResolveError};
pub use session::{MonitoringSession, SessionStatus, Target, TargetStatus, TickResult, Transition};
pub use snapshot::{FilesystemSnapshotStore, InMemorySnapshotStore, SnapshotStore};
pub use stats::{ConfidenceStats, FpsStats, StatisticsAggregator, StatsSummary};
pub use storage::{AlertStore, InMemoryAlertStore, SqliteAlertStore};

/// Smallest region dimension accepted when no explicit minimum is configured.
pub const DEFAULT_MIN_REGION_PX: u32 = 10;

// -------------------- Regions --------------------

/// Axis-aligned rectangle in pixel coordinates, validated at construction.
///
/// A region too small to plausibly contain a tracked object is rejected
/// outright rather than clamped; nothing downstream has to re-check it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Region {
    /// Builds a region with the default minimum size.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self> {
        Self::with_min_size(x1, y1, x2, y2, DEFAULT_MIN_REGION_PX)
    }

    /// Builds a region, requiring both dimensions to be at least `min_px`.
    pub fn with_min_size(x1: f32, y1: f32, x2: f32, y2: f32, min_px: u32) -> Result<Self> {
        if !(x2 > x1 && y2 > y1) {
            return Err(anyhow!(
                "region ({x1},{y1})-({x2},{y2}) must have positive width and height"
            ));
        }
        let min = min_px as f32;
        if x2 - x1 < min || y2 - y1 < min {
            return Err(anyhow!(
                "region ({x1},{y1})-({x2},{y2}) is smaller than the {min_px}px minimum"
            ));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

// -------------------- Station ID Discipline --------------------

/// A station id names this deployment in MQTT topics and log lines, so it
/// must stay topic-safe: lowercase alphanumerics plus `_` and `-`, max 64.
pub fn validate_station_id(station_id: &str) -> Result<()> {
    // Compile once for hot paths.
    static STATION_ID_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re =
        STATION_ID_RE.get_or_init(|| regex::Regex::new(r"^[a-z0-9][a-z0-9_-]{0,63}$").unwrap());

    if !re.is_match(station_id) {
        return Err(anyhow!("station_id must match ^[a-z0-9][a-z0-9_-]{{0,63}}$"));
    }
    Ok(())
}

// -------------------- Alert records --------------------

/// One target's disappearance, as archived and aggregated.
///
/// `region_index` is the 0-based position of the owning region in the list
/// submitted at setup; human-facing text renders it 1-based.
#[derive(Clone, Debug, PartialEq)]
pub struct AlertRecord {
    pub epoch_s: u64,
    pub label: String,
    pub track_id: i64,
    pub region_index: usize,
    pub snapshot: Option<String>,
}

// -------------------- Time helpers --------------------

fn now_s() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow!("system clock before unix epoch: {e}"))?
        .as_secs())
}

fn now_ms() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow!("system clock before unix epoch: {e}"))?
        .as_millis() as u64)
}
