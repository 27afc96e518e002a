//! End-to-end tests for the acquisition pipeline with mocked upstream calls.

mod common;

use std::fs::{self, File};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tempfile::TempDir;

use common::{MockFetcher, MockValidator, TestPipeline, ValidatorMode, SAMPLE_POSTS};
use tweetpulse::events::LimitKind;
use tweetpulse::{
    CachedDataset, ConfigError, Handle, Outcome, PairFailure, Pipeline, PipelineConfig,
    PipelineEvent, RecordingSink, Side, TweetCacheStore,
};

fn backdate(path: &std::path::Path, hours: u64) {
    let file = File::options().write(true).open(path).expect("Should open dataset");
    file.set_modified(SystemTime::now() - Duration::from_secs(hours * 3600))
        .expect("Should set mtime");
}

fn seeded_dir(valid: &str, invalid: &str) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    fs::write(temp_dir.path().join("users_valid.csv"), valid).unwrap();
    fs::write(temp_dir.path().join("users_invalid.csv"), invalid).unwrap();
    temp_dir
}

#[tokio::test]
async fn test_unknown_handle_is_validated_fetched_and_stored() {
    let t = TestPipeline::new(MockValidator::new(&["abcde"]), MockFetcher::new(SAMPLE_POSTS));

    let outcome = t.pipeline.ensure_ready("abcde").await;

    assert_eq!(outcome, Outcome::Ready);
    assert_eq!(t.validator.calls(), 1);
    assert_eq!(t.fetcher.calls(), 1);
    assert!(t.dataset_path("abcde").exists());

    let valid = fs::read_to_string(t.temp_dir.path().join("users_valid.csv")).unwrap();
    assert_eq!(valid, "abcde\n");

    let dataset = t.pipeline.read_dataset("abcde").expect("Dataset should be stored");
    assert_eq!(dataset.handle, "abcde");
    assert_eq!(dataset.records.len(), 4);
    assert!(dataset.records[0].sentiment > 0.0);
    assert!(dataset.records[1].sentiment < 0.0);
    assert_eq!(dataset.records[2].sentiment, 0.0);
    assert!(dataset.records[3].sentiment < 0.0);
    assert_eq!(dataset.records[0].length, SAMPLE_POSTS[0].chars().count());
}

#[tokio::test]
async fn test_known_valid_handle_with_fresh_cache_makes_no_external_calls() {
    let temp_dir = seeded_dir("abcde\n", "");
    let handle = Handle::parse("abcde").unwrap();
    let store = TweetCacheStore::new(temp_dir.path().join("tweets"), 12, RecordingSink::new());
    store.write(&handle, &CachedDataset::new("abcde", vec![])).unwrap();
    backdate(&temp_dir.path().join("tweets").join("abcde.json"), 1);

    let t = TestPipeline::in_dir(temp_dir, MockValidator::new(&[]), MockFetcher::new(SAMPLE_POSTS), |_| {});

    assert_eq!(t.pipeline.ensure_ready("abcde").await, Outcome::Ready);
    assert_eq!(t.validator.calls(), 0);
    assert_eq!(t.fetcher.calls(), 0);
    assert!(t
        .sink
        .events()
        .contains(&PipelineEvent::CacheHit { handle: "abcde".into() }));
}

#[tokio::test]
async fn test_known_invalid_handle_makes_no_external_calls() {
    let temp_dir = seeded_dir("", "zzzzz\n");
    let t = TestPipeline::in_dir(temp_dir, MockValidator::new(&["zzzzz"]), MockFetcher::new(SAMPLE_POSTS), |_| {});

    assert_eq!(t.pipeline.ensure_ready("zzzzz").await, Outcome::InvalidHandle);
    assert_eq!(t.validator.calls(), 0);
    assert_eq!(t.fetcher.calls(), 0);
    assert_eq!(t.pipeline.limiter().lookup_count(), 0);
}

#[tokio::test]
async fn test_transport_failure_is_upstream_unavailable_without_ledger_write() {
    let validator = MockValidator::new(&["abcde"]);
    validator.set_mode(ValidatorMode::Unreachable);
    let t = TestPipeline::new(validator, MockFetcher::new(SAMPLE_POSTS));

    assert_eq!(t.pipeline.ensure_ready("abcde").await, Outcome::UpstreamUnavailable);
    assert_eq!(t.fetcher.calls(), 0);
    assert!(!t.temp_dir.path().join("users_valid.csv").exists());
    assert!(!t.temp_dir.path().join("users_invalid.csv").exists());
    assert!(t
        .sink
        .events()
        .iter()
        .any(|e| matches!(e, PipelineEvent::UpstreamFailed { .. })));
}

#[tokio::test]
async fn test_validator_timeout_is_upstream_unavailable() {
    let validator = MockValidator::new(&["abcde"]);
    validator.set_mode(ValidatorMode::Hang);
    let t = TestPipeline::with_config(validator, MockFetcher::new(SAMPLE_POSTS), |c| {
        c.upstream_timeout_secs = 1;
    });

    let started = Instant::now();
    let outcome = t.pipeline.ensure_ready("abcde").await;

    assert_eq!(outcome, Outcome::UpstreamUnavailable);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(t.pipeline.ledger().verdict(&Handle::parse("abcde").unwrap()).is_none());
}

#[tokio::test]
async fn test_handle_not_found_is_recorded_invalid() {
    let t = TestPipeline::new(MockValidator::new(&[]), MockFetcher::new(SAMPLE_POSTS));

    assert_eq!(t.pipeline.ensure_ready("ghost_user").await, Outcome::InvalidHandle);
    assert_eq!(t.pipeline.ensure_ready("Ghost_User").await, Outcome::InvalidHandle);

    assert_eq!(t.validator.calls(), 1);
    assert_eq!(t.fetcher.calls(), 0);
    let invalid = fs::read_to_string(t.temp_dir.path().join("users_invalid.csv")).unwrap();
    assert_eq!(invalid, "ghost_user\n");
}

#[tokio::test]
async fn test_malformed_handle_is_invalid_without_calls() {
    let t = TestPipeline::new(MockValidator::new(&["abcd"]), MockFetcher::new(SAMPLE_POSTS));

    assert_eq!(t.pipeline.ensure_ready("abcd").await, Outcome::InvalidHandle);
    assert_eq!(t.pipeline.ensure_ready("way_too_long_handle").await, Outcome::InvalidHandle);

    assert_eq!(t.validator.calls(), 0);
    assert_eq!(t.pipeline.limiter().validation_count(), 2);
}

#[tokio::test]
async fn test_input_is_normalized_before_use() {
    let t = TestPipeline::new(MockValidator::new(&["abcde"]), MockFetcher::new(SAMPLE_POSTS));

    assert_eq!(t.pipeline.ensure_ready("  @AbCdE ").await, Outcome::Ready);
    assert!(t.dataset_path("abcde").exists());
    assert!(t.pipeline.read_dataset("ABCDE").is_some());
}

#[tokio::test]
async fn test_fifty_first_validation_is_rate_limited() {
    let t = TestPipeline::new(MockValidator::new(&["abcde"]), MockFetcher::new(SAMPLE_POSTS));

    for _ in 0..50 {
        assert_eq!(t.pipeline.ensure_ready("abcde").await, Outcome::Ready);
    }
    assert_eq!(t.pipeline.ensure_ready("abcde").await, Outcome::RateLimited);
    assert_eq!(t.pipeline.ensure_ready("abcde").await, Outcome::RateLimited);

    assert_eq!(t.validator.calls(), 1);
    assert_eq!(t.fetcher.calls(), 1);
    assert_eq!(t.pipeline.limiter().validation_count(), 52);
    assert_eq!(t.pipeline.limiter().lookup_count(), 50);
    assert!(t.sink.events().contains(&PipelineEvent::RateLimited {
        kind: LimitKind::Validation,
        count: 51
    }));
}

#[tokio::test]
async fn test_lookup_budget_is_checked_after_validation() {
    let t = TestPipeline::with_config(MockValidator::new(&["abcde"]), MockFetcher::new(SAMPLE_POSTS), |c| {
        c.lookup_limit = 1;
    });

    assert_eq!(t.pipeline.ensure_ready("abcde").await, Outcome::Ready);
    assert_eq!(t.pipeline.ensure_ready("abcde").await, Outcome::RateLimited);
    assert_eq!(t.pipeline.limiter().validation_count(), 2);
    assert_eq!(t.fetcher.calls(), 1);
}

#[tokio::test]
async fn test_stale_dataset_is_refetched() {
    let t = TestPipeline::new(MockValidator::new(&["abcde"]), MockFetcher::new(SAMPLE_POSTS));

    assert_eq!(t.pipeline.ensure_ready("abcde").await, Outcome::Ready);
    backdate(&t.dataset_path("abcde"), 13);
    assert_eq!(t.pipeline.ensure_ready("abcde").await, Outcome::Ready);

    assert_eq!(t.fetcher.calls(), 2);
    assert_eq!(t.fetcher.limits(), vec![50, 50]);
}

#[tokio::test]
async fn test_failed_fetch_keeps_previous_dataset() {
    let t = TestPipeline::new(MockValidator::new(&["abcde"]), MockFetcher::new(SAMPLE_POSTS));
    assert_eq!(t.pipeline.ensure_ready("abcde").await, Outcome::Ready);
    let before = t.pipeline.read_dataset("abcde").unwrap();

    backdate(&t.dataset_path("abcde"), 13);
    t.fetcher.set_failing(true);

    assert_eq!(t.pipeline.ensure_ready("abcde").await, Outcome::UpstreamUnavailable);
    assert_eq!(t.pipeline.read_dataset("abcde"), Some(before));
}

#[tokio::test]
async fn test_cache_write_failure_is_upstream_unavailable() {
    let t = TestPipeline::new(MockValidator::new(&["abcde"]), MockFetcher::new(SAMPLE_POSTS));
    // A plain file where the cache directory should be.
    fs::write(t.temp_dir.path().join("tweets"), "").unwrap();

    assert_eq!(t.pipeline.ensure_ready("abcde").await, Outcome::UpstreamUnavailable);
    assert!(t
        .sink
        .events()
        .iter()
        .any(|e| matches!(e, PipelineEvent::CacheWriteFailed { .. })));
}

#[tokio::test]
async fn test_broken_ledger_forces_revalidation_but_not_failure() {
    let temp_dir = TempDir::new().unwrap();
    // Directories in place of the ledger files: unreadable and unwritable.
    fs::create_dir(temp_dir.path().join("users_valid.csv")).unwrap();
    fs::create_dir(temp_dir.path().join("users_invalid.csv")).unwrap();
    let t = TestPipeline::in_dir(temp_dir, MockValidator::new(&["abcde"]), MockFetcher::new(SAMPLE_POSTS), |_| {});

    assert_eq!(t.pipeline.ensure_ready("abcde").await, Outcome::Ready);
    assert_eq!(t.pipeline.ensure_ready("abcde").await, Outcome::Ready);

    assert_eq!(t.validator.calls(), 2);
    assert_eq!(t.fetcher.calls(), 1);
    let events = t.sink.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::LedgerUnreadable { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::LedgerWriteDropped { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_count_every_lookup() {
    let t = TestPipeline::new(MockValidator::new(&["abcde"]), MockFetcher::new(SAMPLE_POSTS));

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let pipeline = Arc::clone(&t.pipeline);
            tokio::spawn(async move { pipeline.ensure_ready("abcde").await })
        })
        .collect();
    let outcomes = futures::future::join_all(tasks).await;

    assert!(outcomes.into_iter().all(|o| o.unwrap() == Outcome::Ready));
    assert_eq!(t.pipeline.limiter().validation_count(), 20);
    assert_eq!(t.pipeline.limiter().lookup_count(), 20);

    let valid = fs::read_to_string(t.temp_dir.path().join("users_valid.csv")).unwrap();
    assert_eq!(valid, "abcde\n");
    let dataset = t.pipeline.read_dataset("abcde").expect("Dataset should parse");
    assert_eq!(dataset.records.len(), SAMPLE_POSTS.len());
}

#[tokio::test]
async fn test_compare_loads_both_datasets() {
    let t = TestPipeline::new(MockValidator::new(&["alpha", "bravo"]), MockFetcher::new(SAMPLE_POSTS));

    let comparison = t.pipeline.compare("alpha", "bravo").await.expect("Both should be ready");

    assert_eq!(comparison.primary.handle, "alpha");
    assert_eq!(comparison.competitor.handle, "bravo");
    assert_eq!(comparison.sentiment_gap(), Some(0.0));
    let (positive, negative) = comparison.primary.split_by_sentiment();
    assert_eq!(positive.len(), 2);
    assert_eq!(negative.len(), 2);
}

#[tokio::test]
async fn test_compare_reports_failing_side() {
    let t = TestPipeline::new(MockValidator::new(&["alpha"]), MockFetcher::new(SAMPLE_POSTS));

    let failure = t.pipeline.compare("alpha", "bravo").await.unwrap_err();
    assert_eq!(
        failure,
        PairFailure {
            side: Side::Competitor,
            outcome: Outcome::InvalidHandle
        }
    );

    let failure = t.pipeline.ensure_pair_ready("nobody", "alpha").await.unwrap_err();
    assert_eq!(failure.side, Side::Primary);
    // The competitor is not looked at once the primary fails.
    assert_eq!(t.validator.calls(), 3);
}

#[test]
fn test_pipeline_rejects_out_of_range_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let base = PipelineConfig {
        data_dir: temp_dir.path().to_path_buf(),
        ..PipelineConfig::default()
    };
    let configs = [
        PipelineConfig {
            batch_size: 0,
            ..base.clone()
        },
        PipelineConfig {
            freshness_hours: 1 << 60,
            ..base.clone()
        },
    ];

    for config in configs {
        let result = Pipeline::new(
            config,
            MockValidator::new(&["abcde"]),
            MockFetcher::new(SAMPLE_POSTS),
            RecordingSink::new(),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
    assert!(!temp_dir.path().join("tweets").exists());
}
