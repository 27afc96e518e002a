//! Acquisition pipeline
//!
//! [`Pipeline::ensure_ready`] is the single entry point for callers: given a
//! handle, it makes sure a validated, fresh, sentiment-scored dataset exists
//! on disk, or says why it can't. Every failure inside is translated into an
//! [`Outcome`]; no error type crosses this boundary.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::cache::TweetCacheStore;
use crate::config::{ConfigError, PipelineConfig};
use crate::data::{CachedDataset, HandleValidator, TweetFetcher, TwitterClient, TwitterError};
use crate::events::{EventSink, LimitKind, PipelineEvent};
use crate::handle::Handle;
use crate::ledger::{HandleLedger, Verdict};
use crate::limiter::RequestLimiter;
use crate::sentiment;

/// Result of a readiness request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A fresh dataset is on disk and can be read with [`Pipeline::read_dataset`]
    Ready,
    /// An admission budget is exhausted for the life of the process
    RateLimited,
    /// The handle is malformed, unknown upstream, or known to be invalid
    InvalidHandle,
    /// The upstream API failed or the fetched data could not be stored
    UpstreamUnavailable,
}

impl Outcome {
    pub fn is_ready(self) -> bool {
        self == Outcome::Ready
    }

    /// Text suitable for showing to the person who asked
    pub fn message(self) -> &'static str {
        match self {
            Outcome::Ready => "Data is ready.",
            Outcome::RateLimited => "Too many searches, please try again later.",
            Outcome::InvalidHandle => {
                "Twitter handle is not valid. It should be 5 to 10 letters, digits or underscores."
            }
            Outcome::UpstreamUnavailable => {
                "Twitter could not be reached. Please try again later or contact the administrator."
            }
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Which handle of a comparison a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Primary,
    Competitor,
}

/// A comparison could not be prepared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{side:?} handle: {outcome}")]
pub struct PairFailure {
    pub side: Side,
    pub outcome: Outcome,
}

/// A pipeline could not be constructed
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Twitter(#[from] TwitterError),
}

/// Datasets for a handle and the competitor it is compared with
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub primary: CachedDataset,
    pub competitor: CachedDataset,
}

impl Comparison {
    /// Primary mean sentiment minus competitor mean sentiment
    ///
    /// `None` if either dataset is empty.
    pub fn sentiment_gap(&self) -> Option<f64> {
        Some(self.primary.mean_sentiment()? - self.competitor.mean_sentiment()?)
    }
}

/// Validation, caching and enrichment composed behind one call
///
/// Construct one per process and share it behind an `Arc`; the admission
/// counters live as long as the pipeline does.
pub struct Pipeline {
    config: PipelineConfig,
    limiter: RequestLimiter,
    ledger: HandleLedger,
    store: TweetCacheStore,
    validator: Arc<dyn HandleValidator>,
    fetcher: Arc<dyn TweetFetcher>,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("limiter", &self.limiter)
            .field("ledger", &self.ledger)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Builds a pipeline with injected upstream collaborators
    ///
    /// Fails only if `config` does not pass [`PipelineConfig::validate`];
    /// unreadable storage degrades at use time instead.
    pub fn new(
        config: PipelineConfig,
        validator: Arc<dyn HandleValidator>,
        fetcher: Arc<dyn TweetFetcher>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let limiter = RequestLimiter::new(config.validation_limit, config.lookup_limit);
        let ledger = HandleLedger::open(config.data_dir.clone(), Arc::clone(&sink));
        let store = TweetCacheStore::new(config.cache_dir(), config.freshness_hours, Arc::clone(&sink));

        Ok(Self {
            config,
            limiter,
            ledger,
            store,
            validator,
            fetcher,
            sink,
        })
    }

    /// Builds a pipeline backed by the live Twitter API
    pub fn with_twitter(config: PipelineConfig, sink: Arc<dyn EventSink>) -> Result<Self, PipelineError> {
        config.validate()?;
        let client = Arc::new(TwitterClient::new(&config.twitter, config.upstream_timeout())?);
        Ok(Self::new(config, client.clone(), client, sink)?)
    }

    pub fn limiter(&self) -> &RequestLimiter {
        &self.limiter
    }

    pub fn ledger(&self) -> &HandleLedger {
        &self.ledger
    }

    /// Makes sure a fresh dataset for `raw_handle` is on disk
    pub async fn ensure_ready(&self, raw_handle: &str) -> Outcome {
        if !self.limiter.admit_validation() {
            return self.rate_limited(LimitKind::Validation, self.limiter.validation_count());
        }

        let handle = match Handle::parse(raw_handle) {
            Ok(handle) => handle,
            Err(e) => {
                debug!(input = raw_handle, error = %e, "rejecting malformed handle");
                return Outcome::InvalidHandle;
            }
        };

        match self.ledger.verdict(&handle) {
            Some(Verdict::Invalid) => {
                debug!(%handle, "handle is in the invalid ledger");
                return Outcome::InvalidHandle;
            }
            Some(Verdict::Valid) => debug!(%handle, "handle is in the valid ledger"),
            None => {
                if let Err(outcome) = self.validate_upstream(&handle).await {
                    return outcome;
                }
            }
        }

        if !self.limiter.admit_lookup() {
            return self.rate_limited(LimitKind::Lookup, self.limiter.lookup_count());
        }

        if self.store.is_fresh(&handle) {
            self.sink.emit(&PipelineEvent::CacheHit {
                handle: handle.to_string(),
            });
            return Outcome::Ready;
        }

        self.refresh(&handle).await
    }

    /// Reads the stored dataset for a handle without touching any budget
    pub fn read_dataset(&self, raw_handle: &str) -> Option<CachedDataset> {
        let handle = Handle::parse(raw_handle).ok()?;
        self.store.read(&handle)
    }

    /// Readies both handles of a comparison, primary first
    ///
    /// Stops at the first handle that is not ready so the competitor's
    /// budget is not spent on a comparison that cannot be shown.
    pub async fn ensure_pair_ready(&self, primary: &str, competitor: &str) -> Result<(), PairFailure> {
        for (side, raw) in [(Side::Primary, primary), (Side::Competitor, competitor)] {
            let outcome = self.ensure_ready(raw).await;
            if !outcome.is_ready() {
                return Err(PairFailure { side, outcome });
            }
        }
        Ok(())
    }

    /// Readies and loads both datasets of a comparison
    ///
    /// A dataset that vanished or became unreadable between the write and
    /// this read is reported as `UpstreamUnavailable` for its side.
    pub async fn compare(&self, primary: &str, competitor: &str) -> Result<Comparison, PairFailure> {
        self.ensure_pair_ready(primary, competitor).await?;

        let missing = |side| PairFailure {
            side,
            outcome: Outcome::UpstreamUnavailable,
        };
        Ok(Comparison {
            primary: self.read_dataset(primary).ok_or_else(|| missing(Side::Primary))?,
            competitor: self
                .read_dataset(competitor)
                .ok_or_else(|| missing(Side::Competitor))?,
        })
    }

    /// Asks upstream about a handle the ledger doesn't know
    async fn validate_upstream(&self, handle: &Handle) -> Result<(), Outcome> {
        let exists = match self.with_deadline(self.validator.check_handle(handle)).await {
            Ok(exists) => exists,
            Err(e) => {
                self.upstream_failed(handle, &e);
                return Err(Outcome::UpstreamUnavailable);
            }
        };

        if let Err(e) = self.ledger.record(handle, exists) {
            debug!(%handle, error = %e, "continuing without ledger entry");
        }

        if exists {
            Ok(())
        } else {
            Err(Outcome::InvalidHandle)
        }
    }

    /// Fetches, enriches and stores a new dataset
    async fn refresh(&self, handle: &Handle) -> Outcome {
        let raws = match self
            .with_deadline(self.fetcher.fetch_recent(handle, self.config.batch_size))
            .await
        {
            Ok(raws) => raws,
            Err(e) => {
                self.upstream_failed(handle, &e);
                return Outcome::UpstreamUnavailable;
            }
        };

        let mut records = sentiment::enrich_batch(raws);
        records.truncate(self.config.batch_size);
        let dataset = CachedDataset::new(handle.as_str(), records);

        match self.store.write(handle, &dataset) {
            Ok(()) => {
                self.sink.emit(&PipelineEvent::DatasetRefreshed {
                    handle: handle.to_string(),
                    records: dataset.records.len(),
                });
                Outcome::Ready
            }
            Err(e) => {
                self.sink.emit(&PipelineEvent::CacheWriteFailed {
                    handle: handle.to_string(),
                    reason: e.to_string(),
                });
                Outcome::UpstreamUnavailable
            }
        }
    }

    async fn with_deadline<T>(
        &self,
        call: impl Future<Output = Result<T, TwitterError>>,
    ) -> Result<T, TwitterError> {
        let deadline = self.config.upstream_timeout();
        tokio::time::timeout(deadline, call)
            .await
            .unwrap_or_else(|_| Err(TwitterError::Timeout(deadline)))
    }

    fn rate_limited(&self, kind: LimitKind, count: u64) -> Outcome {
        self.sink.emit(&PipelineEvent::RateLimited { kind, count });
        Outcome::RateLimited
    }

    fn upstream_failed(&self, handle: &Handle, error: &TwitterError) {
        self.sink.emit(&PipelineEvent::UpstreamFailed {
            handle: handle.to_string(),
            reason: error.to_string(),
        });
    }
}
