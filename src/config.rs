//! sentineld configuration.
//!
//! Precedence: built-in defaults, then the JSON config file named by
//! `SENTINEL_CONFIG`, then `SENTINEL_*` environment variables. Validation
//! runs last and rejects bad values outright; nothing is ever clamped into
//! range, a misconfigured daemon must not start.

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::notify::MqttNotifierConfig;
use crate::{validate_station_id, Region, DEFAULT_MIN_REGION_PX};

pub const DEFAULT_STATION_ID: &str = "front_door";
pub const DEFAULT_DB_PATH: &str = "sentinel.db";
pub const DEFAULT_SNAPSHOT_DIR: &str = "output/alerts";
pub const DEFAULT_ALERT_THRESHOLD_FRAMES: u32 = 25;
pub const DEFAULT_COOLDOWN_SECS: u64 = 300;
pub const DEFAULT_RETENTION_SECS: u64 = 7 * 24 * 3600;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;
pub const DEFAULT_NOTIFIER: &str = "log";
pub const DEFAULT_MQTT_BROKER_ADDR: &str = "localhost:1883";
pub const DEFAULT_MQTT_TOPIC_PREFIX: &str = "sentinel";
pub const DEFAULT_MQTT_CLIENT_ID: &str = "sentineld";

/// Raw rectangle as written in config; validated into [`Region`] later.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct RegionRect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifierKind {
    Log,
    Mqtt,
}

impl FromStr for NotifierKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "log" => Ok(NotifierKind::Log),
            "mqtt" => Ok(NotifierKind::Mqtt),
            other => Err(anyhow!("unknown notifier kind: {other} (expected log or mqtt)")),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SentinelConfigFile {
    station_id: Option<String>,
    db_path: Option<String>,
    snapshot_dir: Option<String>,
    tick_interval_ms: Option<u64>,
    regions: Option<Vec<RegionRect>>,
    alerts: Option<AlertsFile>,
    notifier: Option<NotifierFile>,
}

#[derive(Debug, Default, Deserialize)]
struct AlertsFile {
    threshold_frames: Option<u32>,
    cooldown_seconds: Option<u64>,
    min_region_px: Option<u32>,
    retention_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NotifierFile {
    kind: Option<String>,
    mqtt_broker_addr: Option<String>,
    mqtt_topic_prefix: Option<String>,
    mqtt_client_id: Option<String>,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SentinelConfig {
    pub station_id: String,
    pub db_path: String,
    pub snapshot_dir: String,
    pub tick_interval_ms: u64,
    /// Regions to monitor. Defaults to one demo region centered in a
    /// 640x480 frame so the daemon runs out of the box.
    pub region_rects: Vec<RegionRect>,
    pub alert_threshold_frames: u32,
    pub cooldown_seconds: u64,
    pub min_region_px: u32,
    pub retention_seconds: u64,
    pub notifier: String,
    pub mqtt_broker_addr: String,
    pub mqtt_topic_prefix: String,
    pub mqtt_client_id: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
}

impl SentinelConfig {
    /// Loads defaults, the optional `SENTINEL_CONFIG` JSON file, and
    /// environment overrides, then validates the result.
    pub fn load() -> Result<Self> {
        let file = match env::var("SENTINEL_CONFIG") {
            Ok(path) if !path.trim().is_empty() => read_config_file(Path::new(&path))?,
            _ => SentinelConfigFile::default(),
        };
        let mut cfg = Self::from_file(file);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Self {
        let alerts = file.alerts.unwrap_or_default();
        let notifier = file.notifier.unwrap_or_default();
        Self {
            station_id: file
                .station_id
                .unwrap_or_else(|| DEFAULT_STATION_ID.to_string()),
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            snapshot_dir: file
                .snapshot_dir
                .unwrap_or_else(|| DEFAULT_SNAPSHOT_DIR.to_string()),
            tick_interval_ms: file.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS),
            region_rects: file.regions.unwrap_or_else(default_regions),
            alert_threshold_frames: alerts
                .threshold_frames
                .unwrap_or(DEFAULT_ALERT_THRESHOLD_FRAMES),
            cooldown_seconds: alerts.cooldown_seconds.unwrap_or(DEFAULT_COOLDOWN_SECS),
            min_region_px: alerts.min_region_px.unwrap_or(DEFAULT_MIN_REGION_PX),
            retention_seconds: alerts.retention_seconds.unwrap_or(DEFAULT_RETENTION_SECS),
            notifier: notifier.kind.unwrap_or_else(|| DEFAULT_NOTIFIER.to_string()),
            mqtt_broker_addr: notifier
                .mqtt_broker_addr
                .unwrap_or_else(|| DEFAULT_MQTT_BROKER_ADDR.to_string()),
            mqtt_topic_prefix: notifier
                .mqtt_topic_prefix
                .unwrap_or_else(|| DEFAULT_MQTT_TOPIC_PREFIX.to_string()),
            mqtt_client_id: notifier
                .mqtt_client_id
                .unwrap_or_else(|| DEFAULT_MQTT_CLIENT_ID.to_string()),
            mqtt_username: notifier.mqtt_username,
            mqtt_password: notifier.mqtt_password,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = env::var("SENTINEL_STATION_ID") {
            if !v.trim().is_empty() {
                self.station_id = v;
            }
        }
        if let Ok(v) = env::var("SENTINEL_DB_PATH") {
            if !v.trim().is_empty() {
                self.db_path = v;
            }
        }
        if let Ok(v) = env::var("SENTINEL_SNAPSHOT_DIR") {
            if !v.trim().is_empty() {
                self.snapshot_dir = v;
            }
        }
        if let Ok(v) = env::var("SENTINEL_TICK_INTERVAL_MS") {
            if !v.trim().is_empty() {
                self.tick_interval_ms = v
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("SENTINEL_TICK_INTERVAL_MS must be an integer"))?;
            }
        }
        if let Ok(v) = env::var("SENTINEL_REGIONS") {
            if !v.trim().is_empty() {
                self.region_rects = parse_regions(&v)?;
            }
        }
        if let Ok(v) = env::var("SENTINEL_ALERT_THRESHOLD") {
            if !v.trim().is_empty() {
                self.alert_threshold_frames = v
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("SENTINEL_ALERT_THRESHOLD must be an integer"))?;
            }
        }
        if let Ok(v) = env::var("SENTINEL_COOLDOWN_SECS") {
            if !v.trim().is_empty() {
                self.cooldown_seconds = v
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("SENTINEL_COOLDOWN_SECS must be an integer"))?;
            }
        }
        if let Ok(v) = env::var("SENTINEL_MIN_REGION_PX") {
            if !v.trim().is_empty() {
                self.min_region_px = v
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("SENTINEL_MIN_REGION_PX must be an integer"))?;
            }
        }
        if let Ok(v) = env::var("SENTINEL_RETENTION_SECS") {
            if !v.trim().is_empty() {
                self.retention_seconds = v
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("SENTINEL_RETENTION_SECS must be an integer"))?;
            }
        }
        if let Ok(v) = env::var("SENTINEL_NOTIFIER") {
            if !v.trim().is_empty() {
                self.notifier = v.trim().to_string();
            }
        }
        if let Ok(v) = env::var("SENTINEL_MQTT_BROKER_ADDR") {
            if !v.trim().is_empty() {
                self.mqtt_broker_addr = v;
            }
        }
        if let Ok(v) = env::var("SENTINEL_MQTT_TOPIC_PREFIX") {
            if !v.trim().is_empty() {
                self.mqtt_topic_prefix = v;
            }
        }
        if let Ok(v) = env::var("SENTINEL_MQTT_CLIENT_ID") {
            if !v.trim().is_empty() {
                self.mqtt_client_id = v;
            }
        }
        if let Ok(v) = env::var("SENTINEL_MQTT_USERNAME") {
            if !v.trim().is_empty() {
                self.mqtt_username = Some(v);
            }
        }
        if let Ok(v) = env::var("SENTINEL_MQTT_PASSWORD") {
            if !v.is_empty() {
                self.mqtt_password = Some(v);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        validate_station_id(&self.station_id)?;
        if self.db_path.trim().is_empty() {
            return Err(anyhow!("db_path must not be empty"));
        }
        if self.snapshot_dir.trim().is_empty() {
            return Err(anyhow!("snapshot_dir must not be empty"));
        }
        if self.alert_threshold_frames == 0 {
            return Err(anyhow!("alert_threshold_frames must be at least 1"));
        }
        if self.min_region_px == 0 {
            return Err(anyhow!("min_region_px must be at least 1"));
        }
        if self.retention_seconds == 0 {
            return Err(anyhow!("retention must be greater than zero"));
        }
        if self.tick_interval_ms == 0 {
            return Err(anyhow!("tick_interval_ms must be greater than zero"));
        }
        if self.region_rects.is_empty() {
            return Err(anyhow!("at least one region must be configured"));
        }
        // Region geometry fails load, not first use.
        self.regions()?;

        let kind = self.notifier_kind()?;
        if kind == NotifierKind::Mqtt {
            if self.mqtt_broker_addr.trim().is_empty() {
                return Err(anyhow!("mqtt_broker_addr must not be empty"));
            }
            if self.mqtt_client_id.trim().is_empty() {
                return Err(anyhow!("mqtt_client_id must not be empty"));
            }
            if self.mqtt_topic_prefix.trim().is_empty() {
                return Err(anyhow!("mqtt_topic_prefix must not be empty"));
            }
        }
        Ok(())
    }

    pub fn regions(&self) -> Result<Vec<Region>> {
        self.region_rects
            .iter()
            .map(|r| Region::with_min_size(r.x1, r.y1, r.x2, r.y2, self.min_region_px))
            .collect()
    }

    pub fn notifier_kind(&self) -> Result<NotifierKind> {
        self.notifier.parse()
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_seconds)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn mqtt_notifier_config(&self) -> MqttNotifierConfig {
        MqttNotifierConfig {
            broker_addr: self.mqtt_broker_addr.clone(),
            client_id: self.mqtt_client_id.clone(),
            topic_prefix: self.mqtt_topic_prefix.clone(),
            station_id: self.station_id.clone(),
            username: self.mqtt_username.clone(),
            password: self.mqtt_password.clone(),
        }
    }
}

fn default_regions() -> Vec<RegionRect> {
    vec![RegionRect {
        x1: 80.0,
        y1: 60.0,
        x2: 560.0,
        y2: 420.0,
    }]
}

/// Parses `SENTINEL_REGIONS`: rects separated by `;`, coordinates by `,`.
/// Example: `0,0,100,100;200,50,400,300`.
fn parse_regions(raw: &str) -> Result<Vec<RegionRect>> {
    let mut rects = Vec::new();
    for part in raw.split(';').filter(|p| !p.trim().is_empty()) {
        let coords: Vec<&str> = part.split(',').map(str::trim).collect();
        if coords.len() != 4 {
            return Err(anyhow!(
                "SENTINEL_REGIONS entry '{part}' must be x1,y1,x2,y2"
            ));
        }
        let parse = |s: &str| -> Result<f32> {
            s.parse()
                .map_err(|_| anyhow!("SENTINEL_REGIONS entry '{part}' has a non-numeric value"))
        };
        rects.push(RegionRect {
            x1: parse(coords[0])?,
            y1: parse(coords[1])?,
            x2: parse(coords[2])?,
            y2: parse(coords[3])?,
        });
    }
    Ok(rects)
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let parsed = serde_json::from_str(&raw)
        .with_context(|| format!("invalid JSON in config file {}", path.display()))?;
    Ok(parsed)
}
