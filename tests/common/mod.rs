//! Common test utilities for pipeline integration tests.
//!
//! Provides call-counting mocks for the two upstream collaborators and a
//! fixture that wires them into a pipeline over a temporary data directory.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use tweetpulse::{
    Handle, HandleValidator, Pipeline, PipelineConfig, RawRecord, RecordingSink, TweetFetcher,
    TwitterError,
};

/// How the mock validator answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorMode {
    /// Handles in the known set exist, all others don't
    Answer,
    /// Every call fails as if the connection was refused
    Unreachable,
    /// Every call hangs longer than any test timeout
    Hang,
}

/// Mock handle validator with a configurable set of existing handles
pub struct MockValidator {
    existing: Mutex<HashSet<String>>,
    mode: Mutex<ValidatorMode>,
    calls: AtomicUsize,
}

impl MockValidator {
    pub fn new(existing: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            existing: Mutex::new(existing.iter().map(|s| s.to_string()).collect()),
            mode: Mutex::new(ValidatorMode::Answer),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_mode(&self, mode: ValidatorMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HandleValidator for MockValidator {
    async fn check_handle(&self, handle: &Handle) -> Result<bool, TwitterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().unwrap();
        match mode {
            ValidatorMode::Answer => Ok(self.existing.lock().unwrap().contains(handle.as_str())),
            ValidatorMode::Unreachable => Err(TwitterError::UnexpectedStatus {
                status: 503,
                body: "Failed to send request".into(),
            }),
            ValidatorMode::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(true)
            }
        }
    }
}

/// Mock timeline fetcher returning generated posts
pub struct MockFetcher {
    texts: Vec<String>,
    fail: Mutex<bool>,
    calls: AtomicUsize,
    limits: Mutex<Vec<usize>>,
}

impl MockFetcher {
    pub fn new(texts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            texts: texts.iter().map(|s| s.to_string()).collect(),
            fail: Mutex::new(false),
            calls: AtomicUsize::new(0),
            limits: Mutex::new(Vec::new()),
        })
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The `limit` argument of every call so far
    pub fn limits(&self) -> Vec<usize> {
        self.limits.lock().unwrap().clone()
    }
}

#[async_trait]
impl TweetFetcher for MockFetcher {
    async fn fetch_recent(&self, _handle: &Handle, limit: usize) -> Result<Vec<RawRecord>, TwitterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.limits.lock().unwrap().push(limit);
        if *self.fail.lock().unwrap() {
            return Err(TwitterError::UnexpectedStatus {
                status: 500,
                body: "Internal error".into(),
            });
        }
        Ok(self
            .texts
            .iter()
            .enumerate()
            .take(limit)
            .map(|(i, text)| RawRecord {
                id: 1000 + i as u64,
                text: text.clone(),
                created_at: Utc.with_ymd_and_hms(2024, 7, 15, 12, i as u32 % 60, 0).unwrap(),
                source: "Twitter for iPhone".to_string(),
                likes: i as u64,
            })
            .collect())
    }
}

/// Pipeline wired to mocks over a temporary data directory
pub struct TestPipeline {
    pub pipeline: Arc<Pipeline>,
    pub validator: Arc<MockValidator>,
    pub fetcher: Arc<MockFetcher>,
    pub sink: Arc<RecordingSink>,
    pub temp_dir: TempDir,
}

impl TestPipeline {
    /// Default config: limits of 50, 12 h freshness, batch of 50
    pub fn new(validator: Arc<MockValidator>, fetcher: Arc<MockFetcher>) -> Self {
        Self::with_config(validator, fetcher, |_| {})
    }

    pub fn with_config(
        validator: Arc<MockValidator>,
        fetcher: Arc<MockFetcher>,
        tweak: impl FnOnce(&mut PipelineConfig),
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self::in_dir(temp_dir, validator, fetcher, tweak)
    }

    /// Builds a pipeline over an existing directory, e.g. one seeded with ledger files
    pub fn in_dir(
        temp_dir: TempDir,
        validator: Arc<MockValidator>,
        fetcher: Arc<MockFetcher>,
        tweak: impl FnOnce(&mut PipelineConfig),
    ) -> Self {
        let mut config = PipelineConfig {
            data_dir: temp_dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        tweak(&mut config);
        let sink = RecordingSink::new();
        let pipeline = Arc::new(
            Pipeline::new(config, validator.clone(), fetcher.clone(), sink.clone())
                .expect("Test config should be valid"),
        );
        Self {
            pipeline,
            validator,
            fetcher,
            sink,
            temp_dir,
        }
    }

    pub fn dataset_path(&self, handle: &str) -> std::path::PathBuf {
        self.temp_dir.path().join("tweets").join(format!("{}.json", handle))
    }
}

/// A handful of posts with mixed sentiment
pub const SAMPLE_POSTS: &[&str] = &[
    "@brand your support team was great, thanks!",
    "Worst delivery ever, totally useless https://t.co/xyz",
    "Just landed in Vancouver",
    "not happy with the new update",
];
