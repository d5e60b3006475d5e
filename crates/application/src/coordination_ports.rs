use std::time::Duration;

use async_trait::async_trait;

use stickyroute_core::AppResult;

/// Upper bound of keys passed to one [`CoordinationStore::bulk_compare_and_delete`] call.
pub const BULK_DELETE_BATCH_SIZE: usize = 100;

/// Result of an atomic set-if-absent-else-get.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetIfAbsentOutcome {
    /// Value now stored under the key: the new value, or the existing one.
    pub value: String,
    /// Whether this call created the key.
    pub was_new: bool,
}

/// Shared TTL-capable key-value store used as a distributed lock registry.
///
/// A missing key is never an error; every `Err` means the store could not
/// answer and is reported as `AppError::StoreUnavailable`.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Atomically stores `value` with `ttl` when `key` is absent, otherwise
    /// returns the current value untouched.
    async fn set_if_absent_else_get(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> AppResult<SetIfAbsentOutcome>;

    /// Sets the TTL of `key` to `ttl` only when that lengthens the current one.
    async fn extend_ttl_if_greater(&self, key: &str, ttl: Duration) -> AppResult<()>;

    /// Reads the current value of `key`.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Deletes `key` only when it still holds `expected`, as one atomic step.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> AppResult<bool>;

    /// Unconditionally stores `value` under `key` with a fresh `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Deletes every key in `keys` that still holds `expected` and returns
    /// how many were deleted. Keys holding another value are left alone.
    ///
    /// Callers keep batches at or below [`BULK_DELETE_BATCH_SIZE`].
    async fn bulk_compare_and_delete(&self, keys: &[String], expected: &str) -> AppResult<u64>;
}
