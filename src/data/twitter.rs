//! Twitter REST API client
//!
//! This module defines the two upstream collaborators the pipeline depends
//! on, handle validation and timeline fetching, and a reqwest-backed
//! implementation of both against the v1.1 API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use super::RawRecord;
use crate::config::TwitterConfig;
use crate::handle::Handle;

/// Upstream timestamp format, e.g. "Wed Oct 10 20:19:24 +0000 2018"
const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Upstream error code for an unknown user
const ERROR_USER_NOT_FOUND: i64 = 50;

/// Upstream error code for a suspended user
const ERROR_USER_SUSPENDED: i64 = 63;

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

/// Errors that can occur when talking to the Twitter API
#[derive(Debug, Error)]
pub enum TwitterError {
    /// HTTP request failed (connection, TLS, timeout, body read)
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// The API answered with a status we don't treat as a verdict
    #[error("Unexpected response status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// A post carried a timestamp in an unknown format
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// No bearer token was configured
    #[error("Missing API credentials: set twitter.bearer_token")]
    MissingCredentials,

    /// The call did not finish within the configured timeout
    #[error("Upstream call timed out after {0:?}")]
    Timeout(Duration),
}

/// Checks whether a handle exists upstream
#[async_trait]
pub trait HandleValidator: Send + Sync {
    /// `Ok(false)` is a definitive "no such user"; errors mean the question
    /// could not be answered.
    async fn check_handle(&self, handle: &Handle) -> Result<bool, TwitterError>;
}

/// Retrieves a handle's most recent posts
#[async_trait]
pub trait TweetFetcher: Send + Sync {
    async fn fetch_recent(&self, handle: &Handle, limit: usize) -> Result<Vec<RawRecord>, TwitterError>;
}

/// Error payload returned by the v1.1 API
#[derive(Debug, Deserialize)]
struct ApiErrors {
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
}

/// A single post from the timeline endpoint
#[derive(Debug, Deserialize)]
struct ApiTweet {
    id: u64,
    /// Present with `tweet_mode=extended`
    full_text: Option<String>,
    /// Present in compatibility mode, truncated to 140 characters
    text: Option<String>,
    created_at: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    favorite_count: u64,
}

/// Client for the Twitter v1.1 REST API
#[derive(Debug, Clone)]
pub struct TwitterClient {
    client: Client,
    base_url: String,
    bearer_token: String,
}

impl TwitterClient {
    /// Creates a client from configuration with a per-request timeout
    ///
    /// # Returns
    /// * `Err(TwitterError::MissingCredentials)` - If no bearer token is configured
    pub fn new(config: &TwitterConfig, timeout: Duration) -> Result<Self, TwitterError> {
        let bearer_token = config
            .bearer_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(TwitterError::MissingCredentials)?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer_token,
        })
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<(StatusCode, String), TwitterError> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.bearer_token)
            .query(query)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }
}

#[async_trait]
impl HandleValidator for TwitterClient {
    async fn check_handle(&self, handle: &Handle) -> Result<bool, TwitterError> {
        let (status, body) = self
            .get("users/show.json", &[("screen_name", handle.as_str())])
            .await?;
        classify_user_lookup(status, body)
    }
}

#[async_trait]
impl TweetFetcher for TwitterClient {
    async fn fetch_recent(&self, handle: &Handle, limit: usize) -> Result<Vec<RawRecord>, TwitterError> {
        let count = limit.to_string();
        let (status, body) = self
            .get(
                "statuses/user_timeline.json",
                &[
                    ("screen_name", handle.as_str()),
                    ("count", count.as_str()),
                    ("tweet_mode", "extended"),
                ],
            )
            .await?;

        if !status.is_success() {
            return Err(TwitterError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let mut records = parse_timeline(&body)?;
        records.truncate(limit);
        Ok(records)
    }
}

/// Maps a `users/show` response onto exists / doesn't exist / error
///
/// Only a 404 or an explicit "not found"/"suspended" error code counts as a
/// verdict. Auth failures, rate limiting and server errors say nothing about
/// the handle and are reported as errors.
fn classify_user_lookup(status: StatusCode, body: String) -> Result<bool, TwitterError> {
    if status.is_success() {
        return Ok(true);
    }
    if status == StatusCode::NOT_FOUND {
        return Ok(false);
    }
    if let Ok(payload) = serde_json::from_str::<ApiErrors>(&body) {
        if payload
            .errors
            .iter()
            .any(|e| e.code == ERROR_USER_NOT_FOUND || e.code == ERROR_USER_SUSPENDED)
        {
            return Ok(false);
        }
    }
    Err(TwitterError::UnexpectedStatus {
        status: status.as_u16(),
        body,
    })
}

/// Parses a timeline response body into raw records
fn parse_timeline(body: &str) -> Result<Vec<RawRecord>, TwitterError> {
    let tweets: Vec<ApiTweet> = serde_json::from_str(body)?;
    tweets.into_iter().map(into_raw_record).collect()
}

fn into_raw_record(tweet: ApiTweet) -> Result<RawRecord, TwitterError> {
    let created_at = DateTime::parse_from_str(&tweet.created_at, CREATED_AT_FORMAT)
        .map_err(|_| TwitterError::InvalidTimestamp(tweet.created_at.clone()))?
        .with_timezone(&Utc);

    Ok(RawRecord {
        id: tweet.id,
        text: tweet.full_text.or(tweet.text).unwrap_or_default(),
        created_at,
        source: source_label(&tweet.source),
        likes: tweet.favorite_count,
    })
}

/// Reduces the HTML anchor the API uses for `source` to its label
fn source_label(source: &str) -> String {
    HTML_TAG_RE.replace_all(source, "").trim().to_string()
}
