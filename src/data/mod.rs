//! Core data models for tweetpulse
//!
//! This module contains the record types that flow through the pipeline:
//! raw posts as returned by the Twitter API, the sentiment-scored rows
//! derived from them, and the per-handle dataset persisted by the cache.

pub mod twitter;

pub use twitter::{HandleValidator, TweetFetcher, TwitterClient, TwitterError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A post exactly as fetched from the upstream API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Upstream post identifier
    pub id: u64,
    /// Full text of the post
    pub text: String,
    /// When the post was created
    pub created_at: DateTime<Utc>,
    /// Client label the post was made from (e.g. "Twitter for iPhone")
    pub source: String,
    /// Like count at fetch time
    pub likes: u64,
}

/// A post enriched with its sentiment score
///
/// Rows are never mutated once created; a refetch replaces the whole
/// dataset they belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    /// Upstream post identifier, unique within a handle's dataset
    pub id: u64,
    /// Original text of the post
    pub text: String,
    /// Length of the original text in characters
    pub length: usize,
    /// When the post was created
    pub created_at: DateTime<Utc>,
    /// Client label the post was made from
    pub source: String,
    /// Like count at fetch time
    pub likes: u64,
    /// Polarity of the cleaned text, in [-1.0, 1.0]
    pub sentiment: f64,
}

/// The enriched posts stored for one handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedDataset {
    /// Normalized handle the dataset belongs to
    pub handle: String,
    /// When the posts were fetched from upstream
    pub fetched_at: DateTime<Utc>,
    /// Posts in upstream order (newest first)
    pub records: Vec<EnrichedRecord>,
}

impl CachedDataset {
    /// Creates a dataset stamped with the current time
    pub fn new(handle: impl Into<String>, records: Vec<EnrichedRecord>) -> Self {
        Self {
            handle: handle.into(),
            fetched_at: Utc::now(),
            records,
        }
    }

    /// Splits the records into (non-negative, negative) sentiment groups
    ///
    /// Non-negative posts can be answered automatically, negative ones
    /// are the ones that need a human follow-up.
    pub fn split_by_sentiment(&self) -> (Vec<&EnrichedRecord>, Vec<&EnrichedRecord>) {
        self.records.iter().partition(|r| r.sentiment >= 0.0)
    }

    /// Average sentiment over all records, or `None` for an empty dataset
    pub fn mean_sentiment(&self) -> Option<f64> {
        if self.records.is_empty() {
            return None;
        }
        let total: f64 = self.records.iter().map(|r| r.sentiment).sum();
        Some(total / self.records.len() as f64)
    }
}
