//! Observability events emitted by the pipeline components
//!
//! Components do not log through a global logger they configure themselves.
//! Each one receives an [`EventSink`] at construction and reports notable
//! events through it; [`TracingSink`] forwards them to `tracing`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

/// Which admission budget an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Validation,
    Lookup,
}

/// Something worth surfacing to operators
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A ledger file exists but could not be read; lookups will miss
    LedgerUnreadable { path: PathBuf, reason: String },
    /// A verdict could not be appended to its ledger file
    LedgerWriteDropped {
        handle: String,
        valid: bool,
        reason: String,
    },
    /// A verdict was appended to the ledger
    HandleRecorded { handle: String, valid: bool },
    /// A cached dataset exists but could not be parsed
    CacheUnreadable { handle: String, reason: String },
    /// A fetched dataset could not be persisted
    CacheWriteFailed { handle: String, reason: String },
    /// A fresh dataset was found, no fetch needed
    CacheHit { handle: String },
    /// A new dataset was fetched and written
    DatasetRefreshed { handle: String, records: usize },
    /// An admission budget is exhausted
    RateLimited { kind: LimitKind, count: u64 },
    /// The upstream API could not be reached or answered with an error
    UpstreamFailed { handle: String, reason: String },
}

/// Receiver for [`PipelineEvent`]s
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PipelineEvent);
}

/// Forwards events to the `tracing` subscriber installed by the host application
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::LedgerUnreadable { path, reason } => {
                warn!(path = %path.display(), %reason, "ledger unreadable, forcing re-validation");
            }
            PipelineEvent::LedgerWriteDropped {
                handle,
                valid,
                reason,
            } => {
                warn!(%handle, valid, %reason, "ledger append dropped");
            }
            PipelineEvent::HandleRecorded { handle, valid } => {
                debug!(%handle, valid, "handle recorded in ledger");
            }
            PipelineEvent::CacheUnreadable { handle, reason } => {
                warn!(%handle, %reason, "cached dataset unreadable");
            }
            PipelineEvent::CacheWriteFailed { handle, reason } => {
                warn!(%handle, %reason, "failed to write dataset");
            }
            PipelineEvent::CacheHit { handle } => {
                debug!(%handle, "dataset is fresh, skipping fetch");
            }
            PipelineEvent::DatasetRefreshed { handle, records } => {
                info!(%handle, records, "dataset refreshed");
            }
            PipelineEvent::RateLimited { kind, count } => {
                warn!(?kind, count, "admission limit reached");
            }
            PipelineEvent::UpstreamFailed { handle, reason } => {
                warn!(%handle, %reason, "upstream call failed");
            }
        }
    }
}

/// Sink that keeps every event in memory, for assertions in tests
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of the events received so far
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &PipelineEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
