//! Per-request ownership decision: serve locally, forward, or reclaim and retry.

mod config;
mod retry;


use std::future::Future;
use std::sync::Arc;

use stickyroute_core::{AppError, AppResult};
use stickyroute_domain::{
    DEFAULT_PARTITION_HEADER, LeaseDuration, NodeAddress, PartitionKey, PartitionLabel,
};
use tracing::{debug, warn};

use crate::forwarding_ports::{ForwardRequest, ForwardResponse, ForwardingTransport};
use crate::in_flight_registry::InFlightRegistry;
use crate::ownership_ledger::OwnershipLedger;

pub use config::{PartitionKeyExtractor, RouteConfig, header_extractor};
pub use retry::RetryPolicy;

use config::resolve_route;

/// How one request was answered.
#[derive(Debug)]
pub enum RouteOutcome<T> {
    /// This node owned the partition and ran the handler.
    Local(T),
    /// A live peer owned the partition and answered the forwarded request.
    Forwarded {
        /// Node the request was forwarded to.
        owner: NodeAddress,
        /// Response returned by the owner.
        response: ForwardResponse,
    },
}

/// Routes requests to the single node owning their partition.
#[derive(Clone)]
pub struct PartitionRouter {
    ledger: OwnershipLedger,
    registry: Arc<InFlightRegistry>,
    transport: Arc<dyn ForwardingTransport>,
    instance_config: RouteConfig,
    retry_policy: RetryPolicy,
    default_extractor: PartitionKeyExtractor,
}

impl PartitionRouter {
    /// Creates a router for the node behind `ledger`.
    #[must_use]
    pub fn new(
        ledger: OwnershipLedger,
        registry: Arc<InFlightRegistry>,
        transport: Arc<dyn ForwardingTransport>,
        instance_config: RouteConfig,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            registry,
            transport,
            instance_config,
            retry_policy,
            default_extractor: header_extractor(DEFAULT_PARTITION_HEADER),
        }
    }

    /// Address of the node this router serves.
    #[must_use]
    pub fn node_address(&self) -> &NodeAddress {
        self.ledger.node_address()
    }

    /// Lease a request routed with `per_call` would use.
    #[must_use]
    pub fn effective_lease(&self, per_call: &RouteConfig) -> LeaseDuration {
        resolve_route(per_call, &self.instance_config, &self.default_extractor).lease
    }

    /// Routes one request.
    ///
    /// When this node owns (or just acquired) the partition, `handler` runs
    /// with the lock held and the lock is released afterwards, even if the
    /// handler panics or the caller stops waiting. When a live peer owns it,
    /// the request is forwarded there. When the owner is dead, its lock is
    /// reclaimed and ownership is resolved again, at most
    /// [`RetryPolicy::max_attempts`] times. A reclaim that succeeded on the
    /// last attempt earns one more attempt without backoff.
    pub async fn route<H, Fut, T>(
        &self,
        request: ForwardRequest,
        per_call: &RouteConfig,
        handler: H,
    ) -> AppResult<RouteOutcome<T>>
    where
        H: FnOnce(ForwardRequest) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let route = resolve_route(per_call, &self.instance_config, &self.default_extractor);
        let raw_key = (route.extractor)(&request).ok_or_else(|| {
            AppError::Validation("request does not carry a partition key".to_owned())
        })?;
        let partition_key = PartitionKey::new(raw_key)?;

        // Detached so that a caller hanging up cannot leave a partition
        // tracked without a release.
        let router = self.clone();
        let lease = route.lease;
        tokio::spawn(async move {
            router
                .route_partition(partition_key, lease, request, handler)
                .await
        })
        .await
        .map_err(|join_error| {
            AppError::Internal(format!("partition routing task did not complete: {join_error}"))
        })?
    }

    async fn route_partition<H, Fut, T>(
        &self,
        partition_key: PartitionKey,
        lease: LeaseDuration,
        request: ForwardRequest,
        handler: H,
    ) -> AppResult<RouteOutcome<T>>
    where
        H: FnOnce(ForwardRequest) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let label = partition_key.label();
        let max_attempts = self.retry_policy.max_attempts();

        let mut attempt = 0_u32;
        loop {
            attempt = attempt.saturating_add(1);

            // Tracked before the store is asked, so a local holder finishing
            // meanwhile never deletes the lock this request is about to use.
            let guard = self.registry.lock_partition(&label).await;
            if let Err(error) = self.registry.track(&label) {
                self.registry.unlock_partition(guard);
                return Err(error);
            }

            let owner = match self.ledger.try_acquire_or_locate(&partition_key, lease).await {
                Ok(owner) => owner,
                Err(error) => {
                    self.registry.untrack(&label);
                    self.registry.unlock_partition(guard);
                    return Err(error);
                }
            };

            if owner == *self.ledger.node_address() {
                if let Err(error) = self.confirm_local_hold(&label, lease).await {
                    self.give_back(&label).await;
                    self.registry.unlock_partition(guard);
                    return Err(error);
                }
                self.registry.unlock_partition(guard);

                debug!(partition_key = %partition_key, attempt, "serving partition locally");
                let output = self.serve_locally(label, request, handler).await?;
                return Ok(RouteOutcome::Local(output));
            }

            self.registry.untrack(&label);
            self.registry.unlock_partition(guard);

            if self.ledger.is_alive(&owner).await? {
                debug!(partition_key = %partition_key, owner = %owner, "forwarding to partition owner");
                let response = self.transport.forward(&owner, request).await?;
                return Ok(RouteOutcome::Forwarded { owner, response });
            }

            let reclaimed = self
                .ledger
                .reclaim_if_still_owned_by(&label, &owner)
                .await?;
            warn!(
                partition_key = %partition_key,
                owner = %owner,
                reclaimed,
                attempt,
                "partition owner has no liveness marker"
            );

            let exhausted = if reclaimed {
                attempt > max_attempts
            } else {
                attempt >= max_attempts
            };
            if exhausted {
                return Err(AppError::OwnershipUnresolved(format!(
                    "partition '{partition_key}' still points at dead node '{owner}' after {attempt} attempts"
                )));
            }

            if !reclaimed {
                tokio::time::sleep(self.retry_policy.delay_after(attempt)).await;
            }
        }
    }

    /// Pins a freshly located local lock for the whole lease.
    async fn confirm_local_hold(&self, label: &PartitionLabel, lease: LeaseDuration) -> AppResult<()> {
        self.ledger.extend_lease(label, lease).await?;

        if self.registry.is_closed() {
            return Err(AppError::Unavailable(
                "proxy instance closed while acquiring the partition".to_owned(),
            ));
        }

        Ok(())
    }

    /// Undoes a local acquisition that will not run its handler.
    async fn give_back(&self, label: &PartitionLabel) {
        let last_holder = self.registry.untrack(label);
        // A closed registry has already drained its labels, this one included.
        if !last_holder && !self.registry.is_closed() {
            return;
        }

        if let Err(error) = self.ledger.release(label).await {
            warn!(
                partition = %label,
                error = %error,
                "failed to give back partition lock; it expires with its lease"
            );
        }
    }

    async fn serve_locally<H, Fut, T>(
        &self,
        label: PartitionLabel,
        request: ForwardRequest,
        handler: H,
    ) -> AppResult<T>
    where
        H: FnOnce(ForwardRequest) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handled = tokio::spawn(handler(request)).await;

        let guard = self.registry.lock_partition(&label).await;
        if self.registry.untrack(&label) {
            match self.ledger.release(&label).await {
                Ok(true) => {}
                Ok(false) => warn!(
                    partition = %label,
                    "partition lease ran out before the handler finished; lock left to its new holder"
                ),
                Err(error) => warn!(
                    partition = %label,
                    error = %error,
                    "failed to release partition lock; it expires with its lease"
                ),
            }
        }
        self.registry.unlock_partition(guard);

        match handled {
            Ok(output) => Ok(output),
            Err(join_error) if join_error.is_panic() => Err(AppError::Internal(
                "downstream handler panicked".to_owned(),
            )),
            Err(join_error) => Err(AppError::Internal(format!(
                "downstream handler did not complete: {join_error}"
            ))),
        }
    }
}
