//! Process-wide admission counters
//!
//! Two budgets are tracked: handle validations and dataset lookups. Each
//! admission attempt bumps its counter, and once the post-increment value
//! passes the threshold every later attempt is refused. Counters are never
//! reset while the process lives; there is no time window.

use std::sync::atomic::{AtomicU64, Ordering};

/// Default ceiling for both budgets
pub const DEFAULT_LIMIT: u64 = 50;

/// Admission limiter for validation and lookup requests
#[derive(Debug)]
pub struct RequestLimiter {
    validation_limit: u64,
    lookup_limit: u64,
    validations: AtomicU64,
    lookups: AtomicU64,
}

impl Default for RequestLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, DEFAULT_LIMIT)
    }
}

impl RequestLimiter {
    pub fn new(validation_limit: u64, lookup_limit: u64) -> Self {
        Self {
            validation_limit,
            lookup_limit,
            validations: AtomicU64::new(0),
            lookups: AtomicU64::new(0),
        }
    }

    /// Counts a validation attempt and reports whether it is within budget
    pub fn admit_validation(&self) -> bool {
        admit(&self.validations, self.validation_limit)
    }

    /// Counts a lookup attempt and reports whether it is within budget
    pub fn admit_lookup(&self) -> bool {
        admit(&self.lookups, self.lookup_limit)
    }

    pub fn validation_count(&self) -> u64 {
        self.validations.load(Ordering::SeqCst)
    }

    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }
}

fn admit(counter: &AtomicU64, limit: u64) -> bool {
    let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
    count <= limit
}
