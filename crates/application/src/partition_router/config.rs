use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use stickyroute_domain::{DEFAULT_LEASE_DURATION, LeaseDuration, resolve_setting};

use crate::forwarding_ports::ForwardRequest;

/// Pulls the partition key out of one request; `None` when it carries none.
pub type PartitionKeyExtractor = Arc<dyn Fn(&ForwardRequest) -> Option<String> + Send + Sync>;

/// Builds an extractor reading the named request header.
#[must_use]
pub fn header_extractor(header_name: impl Into<String>) -> PartitionKeyExtractor {
    let header_name = header_name.into();
    Arc::new(move |request: &ForwardRequest| {
        request
            .headers()
            .get(header_name.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    })
}

/// Routing overrides, used both per call and per instance.
///
/// Unset fields fall back to the next layer: call site, then instance, then
/// the built-in defaults.
#[derive(Clone, Default)]
pub struct RouteConfig {
    /// Partition key extractor override.
    pub partition_key_extractor: Option<PartitionKeyExtractor>,
    /// Lease duration override.
    pub lease_duration: Option<LeaseDuration>,
}

impl RouteConfig {
    /// Creates a configuration with every field unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the partition key extractor.
    #[must_use]
    pub fn with_partition_key_extractor(mut self, extractor: PartitionKeyExtractor) -> Self {
        self.partition_key_extractor = Some(extractor);
        self
    }

    /// Reads the partition key from `header_name` instead of the default header.
    #[must_use]
    pub fn with_partition_header(self, header_name: impl Into<String>) -> Self {
        self.with_partition_key_extractor(header_extractor(header_name))
    }

    /// Overrides the lease duration.
    #[must_use]
    pub fn with_lease_duration(mut self, lease_duration: LeaseDuration) -> Self {
        self.lease_duration = Some(lease_duration);
        self
    }
}

impl Debug for RouteConfig {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RouteConfig")
            .field(
                "partition_key_extractor",
                &self.partition_key_extractor.as_ref().map(|_| "custom"),
            )
            .field("lease_duration", &self.lease_duration)
            .finish()
    }
}

/// Effective settings of one routed request.
pub(crate) struct ResolvedRoute {
    pub(crate) extractor: PartitionKeyExtractor,
    pub(crate) lease: LeaseDuration,
}

pub(crate) fn resolve_route(
    per_call: &RouteConfig,
    instance: &RouteConfig,
    default_extractor: &PartitionKeyExtractor,
) -> ResolvedRoute {
    ResolvedRoute {
        extractor: resolve_setting(
            per_call.partition_key_extractor.clone(),
            instance.partition_key_extractor.clone(),
            default_extractor.clone(),
        ),
        lease: resolve_setting(
            per_call.lease_duration,
            instance.lease_duration,
            DEFAULT_LEASE_DURATION,
        ),
    }
}
