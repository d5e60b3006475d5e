//! Domain types and invariants for partition ownership.

#![forbid(unsafe_code)]

mod lease;
mod node;
mod partition;
mod settings;

pub use lease::{
    DEFAULT_HEARTBEAT_PERIOD, DEFAULT_LEASE_DURATION, HeartbeatPeriod, LIVENESS_TTL_MULTIPLIER,
    LeaseDuration,
};
pub use node::{NodeAddress, SERVICE_LABEL_PREFIX, ServiceLabel};
pub use partition::{DEFAULT_PARTITION_HEADER, PARTITION_LABEL_PREFIX, PartitionKey, PartitionLabel};
pub use settings::resolve_setting;
