//! axum integration: route partitioned endpoints through a sticky proxy.

#![forbid(unsafe_code)]

mod error;
mod partition_route;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use partition_route::{DEFAULT_MAX_BODY_BYTES, PartitionRoute, partitioned, route_partitioned};
