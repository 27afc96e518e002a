//! tweetpulse library
//!
//! Fetches a Twitter handle's recent posts, scores each one for sentiment
//! and caches the result on disk. [`Pipeline`] is the entry point; the other
//! modules are its building blocks and are exposed for embedding and tests.

pub mod cache;
pub mod config;
pub mod data;
pub mod events;
pub mod handle;
pub mod ledger;
pub mod limiter;
pub mod pipeline;
pub mod sentiment;

pub use cache::TweetCacheStore;
pub use config::{load_config, load_config_from_str, ConfigError, PipelineConfig, TwitterConfig};
pub use data::{CachedDataset, EnrichedRecord, HandleValidator, RawRecord, TweetFetcher, TwitterClient, TwitterError};
pub use events::{EventSink, PipelineEvent, RecordingSink, TracingSink};
pub use handle::{Handle, HandleError};
pub use ledger::HandleLedger;
pub use limiter::RequestLimiter;
pub use pipeline::{Comparison, Outcome, PairFailure, Pipeline, PipelineError, Side};
