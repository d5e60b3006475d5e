//! Lease and heartbeat durations.

use std::time::Duration;

use stickyroute_core::{AppError, AppResult};

/// Lease applied when neither the call site nor the instance overrides it.
pub const DEFAULT_LEASE_DURATION: LeaseDuration = LeaseDuration(Duration::from_secs(30));

/// Heartbeat period used by the node binary when unconfigured.
pub const DEFAULT_HEARTBEAT_PERIOD: HeartbeatPeriod = HeartbeatPeriod(Duration::from_secs(10));

/// Liveness markers live this many heartbeat periods.
pub const LIVENESS_TTL_MULTIPLIER: u32 = 3;

/// TTL of one partition lock.
///
/// Always at least one millisecond; a zero lease would make the lock vanish
/// before the owner could use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeaseDuration(Duration);

impl LeaseDuration {
    /// Creates a validated lease duration.
    pub fn new(duration: Duration) -> AppResult<Self> {
        if duration < Duration::from_millis(1) {
            return Err(AppError::Validation(
                "lease duration must be at least one millisecond".to_owned(),
            ));
        }

        Ok(Self(duration))
    }

    /// Creates a lease duration from whole seconds.
    pub fn from_secs(seconds: u64) -> AppResult<Self> {
        Self::new(Duration::from_secs(seconds))
    }

    /// Returns the lease as a standard duration.
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl Default for LeaseDuration {
    fn default() -> Self {
        DEFAULT_LEASE_DURATION
    }
}

/// Interval between two liveness publications of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeartbeatPeriod(Duration);

impl HeartbeatPeriod {
    /// Creates a validated heartbeat period.
    pub fn new(duration: Duration) -> AppResult<Self> {
        if duration < Duration::from_millis(1) {
            return Err(AppError::Validation(
                "heartbeat period must be at least one millisecond".to_owned(),
            ));
        }

        Ok(Self(duration))
    }

    /// Returns the period as a standard duration.
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// TTL of the liveness marker published on each tick.
    #[must_use]
    pub fn liveness_ttl(&self) -> Duration {
        self.0
            .checked_mul(LIVENESS_TTL_MULTIPLIER)
            .unwrap_or(Duration::MAX)
    }
}

impl Default for HeartbeatPeriod {
    fn default() -> Self {
        DEFAULT_HEARTBEAT_PERIOD
    }
}
