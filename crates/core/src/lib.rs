//! Shared primitives for all Rust crates in stickyroute.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across stickyroute crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// The node's own advertised address is not usable.
    #[error("misconfigured node address: {0}")]
    MisconfiguredAddress(String),

    /// The coordination store failed for a reason other than a missing key.
    #[error("coordination store unavailable: {0}")]
    StoreUnavailable(String),

    /// Partition ownership could not be settled within the retry budget.
    #[error("partition ownership unresolved: {0}")]
    OwnershipUnresolved(String),

    /// The proxy instance no longer accepts work.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A request could not be forwarded to the owning node.
    #[error("forwarding failed: {0}")]
    Forwarding(String),

    /// Operation conflicts with the current lifecycle state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}
