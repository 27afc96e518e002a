//! Tweet cache store for persisting enriched datasets to disk
//!
//! Provides a `TweetCacheStore` that writes each handle's dataset to its own
//! JSON file. Writes go through a temp file in the same directory that is
//! renamed over the destination, so readers only ever see complete files.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::data::CachedDataset;
use crate::events::{EventSink, PipelineEvent};
use crate::handle::Handle;

/// How long a dataset stays fresh by default, in hours
pub const DEFAULT_FRESHNESS_HOURS: u64 = 12;

/// Errors that can occur when writing a dataset
#[derive(Debug, Error)]
pub enum StoreError {
    /// Directory creation, temp file or rename failed
    #[error("cache I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The dataset could not be serialized
    #[error("failed to serialize dataset: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Reads and writes per-handle datasets in a cache directory
///
/// Writers to the same handle are serialized through a per-handle lock;
/// writers to different handles do not contend.
pub struct TweetCacheStore {
    /// Directory where dataset files are stored
    cache_dir: PathBuf,
    /// Age after which a dataset is stale
    freshness: Duration,
    /// One lock per handle that has been written by this process, pruned
    /// once no writer holds it
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for TweetCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TweetCacheStore")
            .field("cache_dir", &self.cache_dir)
            .field("freshness", &self.freshness)
            .finish_non_exhaustive()
    }
}

impl TweetCacheStore {
    /// Creates a store rooted at `cache_dir` with the given freshness window
    ///
    /// A window too large for `chrono::Duration` saturates to the maximum,
    /// so such datasets never go stale.
    pub fn new(cache_dir: impl Into<PathBuf>, freshness_hours: u64, sink: Arc<dyn EventSink>) -> Self {
        let freshness = i64::try_from(freshness_hours)
            .ok()
            .and_then(Duration::try_hours)
            .unwrap_or(Duration::MAX);
        Self {
            cache_dir: cache_dir.into(),
            freshness,
            write_locks: Mutex::new(HashMap::new()),
            sink,
        }
    }

    /// Returns the path to the dataset file for the given handle
    fn dataset_path(&self, handle: &Handle) -> PathBuf {
        self.cache_dir.join(format!("{}.json", handle))
    }

    /// Ensures the cache directory exists
    fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }

    fn write_lock(&self, handle: &Handle) -> Arc<Mutex<()>> {
        let mut locks = self
            .write_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(handle.as_str().to_string()).or_default())
    }

    /// Whether a dataset younger than the freshness window exists right now
    pub fn is_fresh(&self, handle: &Handle) -> bool {
        self.is_fresh_at(handle, Utc::now())
    }

    /// Whether a dataset younger than the freshness window exists at `now`
    ///
    /// Age is measured from the file's modification time. A missing file is
    /// never fresh.
    pub fn is_fresh_at(&self, handle: &Handle, now: DateTime<Utc>) -> bool {
        let modified = match fs::metadata(self.dataset_path(handle)).and_then(|m| m.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(_) => return false,
        };
        now - modified < self.freshness
    }

    /// Replaces the dataset stored for a handle
    ///
    /// The new content is written to a temp file next to the destination and
    /// renamed over it once fully flushed. On any error the temp file is
    /// removed and the previous dataset is left untouched.
    pub fn write(&self, handle: &Handle, dataset: &CachedDataset) -> Result<(), StoreError> {
        self.ensure_dir()?;

        let lock = self.write_lock(handle);
        let result = {
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.replace_file(handle, dataset)
        };
        self.release_write_lock(handle, lock);
        result
    }

    fn replace_file(&self, handle: &Handle, dataset: &CachedDataset) -> Result<(), StoreError> {
        let temp = NamedTempFile::new_in(&self.cache_dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, dataset)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(self.dataset_path(handle)).map_err(|e| e.error)?;
        Ok(())
    }

    /// Drops the map entry when no other writer holds or waits on the lock
    fn release_write_lock(&self, handle: &Handle, lock: Arc<Mutex<()>>) {
        let mut locks = self
            .write_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the map, one held here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(handle.as_str());
        }
    }

    /// Number of handles with a live write lock
    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.write_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Reads the dataset stored for a handle
    ///
    /// Returns `None` if the file doesn't exist or cannot be parsed; callers
    /// treat both the same way as a stale dataset.
    pub fn read(&self, handle: &Handle) -> Option<CachedDataset> {
        let content = match fs::read_to_string(self.dataset_path(handle)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                self.report_unreadable(handle, e.to_string());
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(dataset) => Some(dataset),
            Err(e) => {
                self.report_unreadable(handle, e.to_string());
                None
            }
        }
    }

    fn report_unreadable(&self, handle: &Handle, reason: String) {
        self.sink.emit(&PipelineEvent::CacheUnreadable {
            handle: handle.to_string(),
            reason,
        });
    }
}
