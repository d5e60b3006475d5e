//! Partition keys and the store labels derived from them.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use stickyroute_core::{AppError, AppResult, NonEmptyString};

/// Request header read when no partition key extractor is configured.
pub const DEFAULT_PARTITION_HEADER: &str = "X-Partition-Key";

/// Store key prefix for partition locks.
pub const PARTITION_LABEL_PREFIX: &str = "partition:";

/// Opaque unit of affinity, e.g. a tenant or session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey(NonEmptyString);

impl PartitionKey {
    /// Creates a validated partition key.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        NonEmptyString::new(value).map(Self).map_err(|_| {
            AppError::Validation("partition key must not be empty or whitespace".to_owned())
        })
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the store label of the lock guarding this partition.
    #[must_use]
    pub fn label(&self) -> PartitionLabel {
        PartitionLabel(format!("{PARTITION_LABEL_PREFIX}{}", self.as_str()))
    }
}

impl Display for PartitionKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Store key of one partition lock (`partition:<key>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionLabel(String);

impl PartitionLabel {
    /// Returns the underlying store key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&PartitionKey> for PartitionLabel {
    fn from(value: &PartitionKey) -> Self {
        value.label()
    }
}

impl Display for PartitionLabel {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}
