//! Alert snapshot persistence.
//!
//! When a tick produces transitions, the dispatcher saves exactly one frame
//! for the whole batch and shares the returned reference across every record
//! and notification of that batch. A failing store is logged and surfaced in
//! the dispatch outcome but never stops the pipeline.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use crate::frame::Frame;
use crate::now_ms;

pub trait SnapshotStore: Send + Sync {
    /// Persists one frame, returning an opaque reference (path, key, ...).
    fn save(&self, frame: &Frame) -> Result<String>;
}

/// Writes `alert_<epoch_ms>.jpg` files under one directory.
pub struct FilesystemSnapshotStore {
    dir: PathBuf,
}

impl FilesystemSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SnapshotStore for FilesystemSnapshotStore {
    fn save(&self, frame: &Frame) -> Result<String> {
        // Created on demand so a wiped output directory heals itself.
        std::fs::create_dir_all(&self.dir)?;

        let path = self.dir.join(format!("alert_{}.jpg", now_ms()?));
        let image =
            image::RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
                .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        image.save_with_format(&path, image::ImageFormat::Jpeg)?;

        let reference = path.display().to_string();
        log::info!("snapshot saved: {reference}");
        Ok(reference)
    }
}

/// Test/ephemeral store. Counts saves and can be switched to fail.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    saved: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn saved(&self) -> Vec<String> {
        self.saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn saved_count(&self) -> usize {
        self.saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn save(&self, _frame: &Frame) -> Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("snapshot store is set to fail"));
        }
        let mut saved = self
            .saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let reference = format!("mem:alert-{}", saved.len());
        saved.push(reference.clone());
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filesystem_store_writes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemSnapshotStore::new(dir.path().join("alerts"));
        let frame = Frame::synthetic(32, 24, 7);

        let reference = store.save(&frame).unwrap();
        assert!(reference.ends_with(".jpg"));
        assert!(reference.contains("alert_"));

        let bytes = std::fs::read(&reference).unwrap();
        // JPEG SOI marker.
        assert_eq!(&bytes[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn filesystem_store_creates_directory_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FilesystemSnapshotStore::new(&nested);
        store.save(&Frame::synthetic(16, 16, 0)).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn in_memory_store_counts_and_fails_on_demand() {
        let store = InMemorySnapshotStore::new();
        let frame = Frame::synthetic(16, 16, 0);

        let first = store.save(&frame).unwrap();
        assert_eq!(first, "mem:alert-0");
        assert_eq!(store.saved_count(), 1);

        store.set_failing(true);
        assert!(store.save(&frame).is_err());
        assert_eq!(store.saved_count(), 1);

        store.set_failing(false);
        assert!(store.save(&frame).is_ok());
        assert_eq!(store.saved(), vec!["mem:alert-0", "mem:alert-1"]);
    }
}
