//! Persisted allow/deny ledger of validated handles
//!
//! Two append-only text files, one handle per line, remember which handles
//! the upstream API confirmed or rejected. Both are loaded into memory when
//! the ledger is opened and every new verdict is appended to disk before it
//! becomes visible in memory.
//!
//! Lookups check the valid list first, then the invalid list; the first
//! match wins. A handle already present in either list is never appended
//! again, so the verdict recorded first is the one that sticks.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::events::{EventSink, PipelineEvent};
use crate::handle::Handle;

/// File holding handles the upstream API confirmed
pub const VALID_FILE: &str = "users_valid.csv";

/// File holding handles the upstream API rejected
pub const INVALID_FILE: &str = "users_invalid.csv";

/// Errors that can occur when appending to the ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger file could not be opened or written
    #[error("failed to append to {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Outcome of a ledger lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid,
}

#[derive(Debug, Default)]
struct LedgerState {
    valid: HashSet<String>,
    invalid: HashSet<String>,
    /// Set when an existing ledger file could not be read at open time
    unreadable: bool,
}

/// Durable record of past handle validations
pub struct HandleLedger {
    dir: PathBuf,
    state: Mutex<LedgerState>,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for HandleLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleLedger")
            .field("dir", &self.dir)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl HandleLedger {
    /// Opens the ledger stored in `dir`, loading both lists
    ///
    /// Missing files are treated as empty lists. If a file exists but cannot
    /// be read, the ledger reports a miss for every lookup so that handles
    /// get re-validated upstream instead of failing the request.
    pub fn open(dir: impl Into<PathBuf>, sink: Arc<dyn EventSink>) -> Self {
        let dir = dir.into();
        let mut state = LedgerState::default();

        for (file, set) in [(VALID_FILE, &mut state.valid), (INVALID_FILE, &mut state.invalid)] {
            let path = dir.join(file);
            match load_entries(&path) {
                Ok(entries) => set.extend(entries),
                Err(e) => {
                    state.unreadable = true;
                    sink.emit(&PipelineEvent::LedgerUnreadable {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Self {
            dir,
            state: Mutex::new(state),
            sink,
        }
    }

    pub fn is_known_valid(&self, handle: &Handle) -> bool {
        self.verdict(handle) == Some(Verdict::Valid)
    }

    pub fn is_known_invalid(&self, handle: &Handle) -> bool {
        self.verdict(handle) == Some(Verdict::Invalid)
    }

    /// Looks a handle up, valid list first
    ///
    /// Returns `None` when the handle is in neither list, or when the ledger
    /// could not be loaded.
    pub fn verdict(&self, handle: &Handle) -> Option<Verdict> {
        let state = self.lock();
        if state.unreadable {
            return None;
        }
        if state.valid.contains(handle.as_str()) {
            Some(Verdict::Valid)
        } else if state.invalid.contains(handle.as_str()) {
            Some(Verdict::Invalid)
        } else {
            None
        }
    }

    /// Appends a verdict for a handle not yet present in either list
    ///
    /// Recording a handle that is already known is a no-op. On append failure
    /// the line is dropped and an event is emitted; the verdict is still kept
    /// in memory for the rest of the process.
    pub fn record(&self, handle: &Handle, valid: bool) -> Result<(), LedgerError> {
        let mut state = self.lock();
        let key = handle.as_str();
        if state.valid.contains(key) || state.invalid.contains(key) {
            return Ok(());
        }

        let path = self.dir.join(if valid { VALID_FILE } else { INVALID_FILE });
        let appended = append_line(&path, key);

        if valid {
            state.valid.insert(key.to_string());
        } else {
            state.invalid.insert(key.to_string());
        }

        match appended {
            Ok(()) => {
                self.sink.emit(&PipelineEvent::HandleRecorded {
                    handle: key.to_string(),
                    valid,
                });
                Ok(())
            }
            Err(source) => {
                self.sink.emit(&PipelineEvent::LedgerWriteDropped {
                    handle: key.to_string(),
                    valid,
                    reason: source.to_string(),
                });
                Err(LedgerError::Append { path, source })
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Reads one ledger file, normalizing each line for case-insensitive matching
///
/// Lines that are not valid UTF-8 are skipped; only a failed read of the file
/// itself is an error.
fn load_entries(path: &Path) -> io::Result<Vec<String>> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    Ok(content
        .split(|b| *b == b'\n')
        .filter_map(|line| std::str::from_utf8(line).ok())
        .map(|line| line.trim().to_lowercase())
        .filter(|line| !line.is_empty())
        .collect())
}

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(format!("{}\n", line).as_bytes())?;
    file.flush()?;
    file.sync_data()
}
