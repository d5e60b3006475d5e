//! Application services and ports.

#![forbid(unsafe_code)]

mod coordination_ports;
mod forwarding_ports;
mod heartbeat;
mod in_flight_registry;
mod ownership_ledger;
mod partition_router;
mod sticky_proxy;

#[cfg(test)]
mod test_support;

pub use coordination_ports::{BULK_DELETE_BATCH_SIZE, CoordinationStore, SetIfAbsentOutcome};
pub use forwarding_ports::{ForwardRequest, ForwardResponse, ForwardingTransport};
pub use heartbeat::spawn_heartbeat;
pub use in_flight_registry::{InFlightRegistry, PartitionGuard};
pub use ownership_ledger::OwnershipLedger;
pub use partition_router::{
    PartitionKeyExtractor, PartitionRouter, RetryPolicy, RouteConfig, RouteOutcome,
    header_extractor,
};
pub use sticky_proxy::{CloseReport, ProxyOptions, StickyProxy};
