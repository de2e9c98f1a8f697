//! Durable alert archive.
//!
//! Each transitioning target becomes one row; the archive feeds the CSV
//! export tool and survives restarts. Writes happen on the dispatch path but
//! a write failure is logged and swallowed there, so archive trouble never
//! stalls monitoring.

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection};
use std::time::Duration;

use crate::{now_s, AlertRecord};

pub trait AlertStore: Send {
    fn append(&mut self, record: &AlertRecord) -> Result<()>;

    /// Most recent records first, at most `limit`.
    fn recent(&self, limit: usize) -> Result<Vec<AlertRecord>>;

    fn count(&self) -> Result<u64>;

    /// Drops records older than `retention` before now.
    fn prune_older_than(&mut self, retention: Duration) -> Result<()>;
}

pub struct SqliteAlertStore {
    conn: Connection,
}

impl SqliteAlertStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS alert_events (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              created_at INTEGER NOT NULL,
              label TEXT NOT NULL,
              track_id INTEGER NOT NULL,
              region_index INTEGER NOT NULL,
              snapshot_ref TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_alert_events_created ON alert_events(created_at);
            "#,
        )?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlertRecord> {
        Ok(AlertRecord {
            epoch_s: row.get::<_, i64>(0)? as u64,
            label: row.get(1)?,
            track_id: row.get(2)?,
            region_index: row.get::<_, i64>(3)? as usize,
            snapshot: row.get(4)?,
        })
    }
}

impl AlertStore for SqliteAlertStore {
    fn append(&mut self, record: &AlertRecord) -> Result<()> {
        let created_at = i64::try_from(record.epoch_s)
            .map_err(|_| anyhow!("alert timestamp exceeds i64 range"))?;
        self.conn.execute(
            "INSERT INTO alert_events (created_at, label, track_id, region_index, snapshot_ref)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                created_at,
                record.label,
                record.track_id,
                record.region_index as i64,
                record.snapshot,
            ],
        )?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<AlertRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT created_at, label, track_id, region_index, snapshot_ref
             FROM alert_events ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], Self::row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM alert_events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn prune_older_than(&mut self, retention: Duration) -> Result<()> {
        let cutoff = now_s()?.saturating_sub(retention.as_secs());
        let cutoff =
            i64::try_from(cutoff).map_err(|_| anyhow!("retention cutoff exceeds i64 range"))?;
        let pruned = self
            .conn
            .execute("DELETE FROM alert_events WHERE created_at < ?1", params![cutoff])?;
        if pruned > 0 {
            log::info!("alert archive: pruned {pruned} expired record(s)");
        }
        Ok(())
    }
}

/// Archive for tests and ephemeral runs.
#[derive(Default)]
pub struct InMemoryAlertStore {
    records: Vec<AlertRecord>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlertStore for InMemoryAlertStore {
    fn append(&mut self, record: &AlertRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<AlertRecord>> {
        Ok(self.records.iter().rev().take(limit).cloned().collect())
    }

    fn count(&self) -> Result<u64> {
        Ok(self.records.len() as u64)
    }

    fn prune_older_than(&mut self, retention: Duration) -> Result<()> {
        let cutoff = now_s()?.saturating_sub(retention.as_secs());
        self.records.retain(|r| r.epoch_s >= cutoff);
        Ok(())
    }
}
