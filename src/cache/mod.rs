//! Cache module for storing enriched datasets to disk
//!
//! This module provides a store that persists one dataset per handle as a
//! JSON file. Freshness is judged from the file's modification time with a
//! configurable TTL (12 hours by default); a missing, stale or unreadable
//! file all mean the same thing to callers: fetch again.

mod store;

pub use store::{StoreError, TweetCacheStore, DEFAULT_FRESHNESS_HOURS};
