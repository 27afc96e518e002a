//! Twitter handle normalization
//!
//! Handles arrive as free-form user input ("@Some_User ", "some user!") and
//! are reduced to the canonical lowercase form used as ledger entry and
//! cache file name.

use std::fmt;

use thiserror::Error;

/// Shortest accepted handle after normalization
pub const MIN_HANDLE_LEN: usize = 5;

/// Longest accepted handle after normalization
pub const MAX_HANDLE_LEN: usize = 10;

/// Errors produced when a string cannot be turned into a [`Handle`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    /// Nothing left after normalization
    #[error("handle is empty")]
    Empty,

    /// Fewer than MIN_HANDLE_LEN characters after normalization
    #[error("handle '{0}' is shorter than {} characters", MIN_HANDLE_LEN)]
    TooShort(String),

    /// More than MAX_HANDLE_LEN characters after normalization
    #[error("handle '{0}' is longer than {} characters", MAX_HANDLE_LEN)]
    TooLong(String),
}

/// A normalized, length-checked Twitter handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(String);

impl Handle {
    /// Normalizes `raw` and checks its length
    pub fn parse(raw: &str) -> Result<Self, HandleError> {
        let normalized = normalize(raw);
        match normalized.len() {
            0 => Err(HandleError::Empty),
            n if n < MIN_HANDLE_LEN => Err(HandleError::TooShort(normalized)),
            n if n > MAX_HANDLE_LEN => Err(HandleError::TooLong(normalized)),
            _ => Ok(Self(normalized)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Reduces user input to the canonical handle form
///
/// Strips surrounding whitespace and a leading `@`, drops every character
/// that is not an ASCII letter, digit or underscore, and lowercases the rest.
/// Applying it twice gives the same result as applying it once.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('@').unwrap_or(trimmed);
    trimmed
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
