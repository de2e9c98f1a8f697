//! Passive statistics sink.
//!
//! One aggregator instance is built by the application assembly and shared
//! (`Arc`) between the tick path and the notification workers; nothing in
//! here is global. Recorders never fail and never block on anything but the
//! inner mutex, which is held only for short copies.
//!
//! All bucketing is plain integer epoch math in UTC; no timezone database.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::{now_s, AlertRecord};

/// Rolling caps keep the aggregator's memory bounded on long runs.
const MAX_FPS_SAMPLES: usize = 1000;
const MAX_CONFIDENCE_SAMPLES: usize = 500;
const OBJECTS_TRACKED_WINDOW_S: u64 = 3600;
const FPS_HISTORY_RETURNED: usize = 100;
const OVER_TIME_BUCKET_S: u64 = 1800;

const SECONDS_PER_DAY: u64 = 86_400;
const SECONDS_PER_HOUR: u64 = 3_600;

#[derive(Debug, Default)]
struct StatsInner {
    alerts: Vec<AlertRecord>,
    fps_samples: VecDeque<f64>,
    confidence_samples: VecDeque<f32>,
    /// (epoch_s, count) samples inside the rolling window.
    objects_tracked: VecDeque<(u64, usize)>,
    notifications_sent: u64,
    notification_failures: u64,
    started_epoch_s: u64,
}

/// Everything the daemon's periodic status line needs, in one copy.
#[derive(Clone, Debug, PartialEq)]
pub struct StatsSummary {
    pub total_alerts: u64,
    pub alerts_today: u64,
    pub uptime_s: u64,
    pub current_fps: f64,
    pub average_fps: f64,
    pub most_common_label: Option<(String, u64)>,
    pub current_objects_tracked: usize,
    pub notifications_sent: u64,
    pub notification_failures: u64,
    pub started_epoch_s: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FpsStats {
    pub current: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    /// Most recent samples, oldest first.
    pub recent: Vec<f64>,
}

/// Detection confidence on a 0-100 scale.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfidenceStats {
    pub average_pct: f64,
    pub min_pct: f64,
    pub max_pct: f64,
    pub samples: usize,
}

/// Injected sink for everything the pipeline wants to count.
pub struct StatisticsAggregator {
    inner: Mutex<StatsInner>,
}

impl Default for StatisticsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsAggregator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StatsInner {
                started_epoch_s: now_s().unwrap_or(0),
                ..StatsInner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsInner> {
        // A poisoned lock still holds valid counters; keep serving.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---- recorders ----

    pub fn record_alert(&self, record: AlertRecord) {
        self.lock().alerts.push(record);
    }

    pub fn record_fps(&self, fps: f64) {
        let mut inner = self.lock();
        inner.fps_samples.push_back(fps);
        while inner.fps_samples.len() > MAX_FPS_SAMPLES {
            inner.fps_samples.pop_front();
        }
    }

    pub fn record_detection_confidence(&self, confidence: f32) {
        let mut inner = self.lock();
        inner.confidence_samples.push_back(confidence);
        while inner.confidence_samples.len() > MAX_CONFIDENCE_SAMPLES {
            inner.confidence_samples.pop_front();
        }
    }

    pub fn record_objects_tracked(&self, count: usize) {
        self.record_objects_tracked_at(now_s().unwrap_or(0), count);
    }

    /// Explicit-timestamp variant; the window is measured from the newest
    /// sample, so replayed histories behave the same as live ones.
    pub fn record_objects_tracked_at(&self, epoch_s: u64, count: usize) {
        let mut inner = self.lock();
        inner.objects_tracked.push_back((epoch_s, count));
        let cutoff = epoch_s.saturating_sub(OBJECTS_TRACKED_WINDOW_S);
        while matches!(inner.objects_tracked.front(), Some((t, _)) if *t < cutoff) {
            inner.objects_tracked.pop_front();
        }
    }

    /// Records one notification attempt's outcome. Called from worker
    /// threads after delivery resolves.
    pub fn record_notification(&self, success: bool) {
        let mut inner = self.lock();
        if success {
            inner.notifications_sent += 1;
        } else {
            inner.notification_failures += 1;
        }
    }

    // ---- views ----

    pub fn total_alerts(&self) -> u64 {
        self.lock().alerts.len() as u64
    }

    pub fn alerts(&self) -> Vec<AlertRecord> {
        self.lock().alerts.clone()
    }

    pub fn summary(&self) -> StatsSummary {
        let inner = self.lock();
        let now = now_s().unwrap_or(0);
        let today = now / SECONDS_PER_DAY;

        let alerts_today = inner
            .alerts
            .iter()
            .filter(|a| a.epoch_s / SECONDS_PER_DAY == today)
            .count() as u64;

        let mut by_label: BTreeMap<&str, u64> = BTreeMap::new();
        for alert in &inner.alerts {
            *by_label.entry(alert.label.as_str()).or_default() += 1;
        }
        let mut most_common_label: Option<(String, u64)> = None;
        for (label, count) in by_label {
            if most_common_label
                .as_ref()
                .map(|(_, best)| count > *best)
                .unwrap_or(true)
            {
                most_common_label = Some((label.to_string(), count));
            }
        }

        let average_fps = mean(inner.fps_samples.iter().copied());

        StatsSummary {
            total_alerts: inner.alerts.len() as u64,
            alerts_today,
            uptime_s: now.saturating_sub(inner.started_epoch_s),
            current_fps: inner.fps_samples.back().copied().unwrap_or(0.0),
            average_fps,
            most_common_label,
            current_objects_tracked: inner
                .objects_tracked
                .back()
                .map(|(_, count)| *count)
                .unwrap_or(0),
            notifications_sent: inner.notifications_sent,
            notification_failures: inner.notification_failures,
            started_epoch_s: inner.started_epoch_s,
        }
    }

    /// Alert counts per UTC hour of day, all 24 entries present.
    pub fn alerts_by_hour(&self) -> [u64; 24] {
        let inner = self.lock();
        let mut hours = [0u64; 24];
        for alert in &inner.alerts {
            let hour = ((alert.epoch_s % SECONDS_PER_DAY) / SECONDS_PER_HOUR) as usize;
            hours[hour] += 1;
        }
        hours
    }

    pub fn alerts_by_object(&self) -> BTreeMap<String, u64> {
        let inner = self.lock();
        let mut by_label = BTreeMap::new();
        for alert in &inner.alerts {
            *by_label.entry(alert.label.clone()).or_default() += 1;
        }
        by_label
    }

    /// Alert counts in 30-minute buckets over the trailing window,
    /// ascending by bucket start. Empty buckets are not materialized.
    pub fn alerts_over_time(&self, window_s: u64) -> Vec<(u64, u64)> {
        let inner = self.lock();
        let cutoff = now_s().unwrap_or(0).saturating_sub(window_s);
        let mut buckets: BTreeMap<u64, u64> = BTreeMap::new();
        for alert in inner.alerts.iter().filter(|a| a.epoch_s >= cutoff) {
            let bucket = alert.epoch_s / OVER_TIME_BUCKET_S * OVER_TIME_BUCKET_S;
            *buckets.entry(bucket).or_default() += 1;
        }
        buckets.into_iter().collect()
    }

    /// UTC hour with the most alerts; earliest hour wins ties. None until
    /// the first alert.
    pub fn peak_alert_hour(&self) -> Option<(usize, u64)> {
        let hours = self.alerts_by_hour();
        let mut peak: Option<(usize, u64)> = None;
        for (hour, &count) in hours.iter().enumerate() {
            if count > 0 && peak.map(|(_, best)| count > best).unwrap_or(true) {
                peak = Some((hour, count));
            }
        }
        peak
    }

    pub fn fps_stats(&self) -> FpsStats {
        let inner = self.lock();
        let samples = &inner.fps_samples;
        let recent_from = samples.len().saturating_sub(FPS_HISTORY_RETURNED);
        FpsStats {
            current: samples.back().copied().unwrap_or(0.0),
            average: mean(samples.iter().copied()),
            min: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max: samples.iter().copied().fold(0.0, f64::max),
            recent: samples.iter().skip(recent_from).copied().collect(),
        }
        .normalized()
    }

    pub fn confidence_stats(&self) -> ConfidenceStats {
        let inner = self.lock();
        let samples = &inner.confidence_samples;
        if samples.is_empty() {
            return ConfidenceStats {
                average_pct: 0.0,
                min_pct: 0.0,
                max_pct: 0.0,
                samples: 0,
            };
        }
        let mean_pct = mean(samples.iter().map(|&c| c as f64)) * 100.0;
        ConfidenceStats {
            average_pct: mean_pct,
            min_pct: samples.iter().copied().fold(f32::INFINITY, f32::min) as f64 * 100.0,
            max_pct: samples.iter().copied().fold(0.0, f32::max) as f64 * 100.0,
            samples: samples.len(),
        }
    }

    pub fn uptime_s(&self) -> u64 {
        now_s()
            .unwrap_or(0)
            .saturating_sub(self.lock().started_epoch_s)
    }

    /// Drops every counter and sample and restarts the session clock.
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = StatsInner {
            started_epoch_s: now_s().unwrap_or(0),
            ..StatsInner::default()
        };
    }
}

impl FpsStats {
    fn normalized(mut self) -> Self {
        if !self.min.is_finite() {
            self.min = 0.0;
        }
        self
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0u32;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
