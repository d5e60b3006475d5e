//! Partition lock protocol over the coordination store.
//!
//! Locks live under `partition:<key>` and hold the owner's canonical address.
//! Liveness markers live under `service:<address>` and hold the publishing
//! instance's id, so a restarted node never deletes its predecessor's marker.

use std::sync::Arc;
use std::time::Duration;

use stickyroute_core::{AppError, AppResult};
use stickyroute_domain::{LeaseDuration, NodeAddress, PartitionKey, PartitionLabel};
use tracing::debug;
use uuid::Uuid;

use crate::coordination_ports::{BULK_DELETE_BATCH_SIZE, CoordinationStore};


/// Ownership operations of one node against the shared store.
#[derive(Clone)]
pub struct OwnershipLedger {
    store: Arc<dyn CoordinationStore>,
    node_address: NodeAddress,
    instance_id: String,
}

impl OwnershipLedger {
    /// Creates a ledger acting on behalf of `node_address`.
    #[must_use]
    pub fn new(store: Arc<dyn CoordinationStore>, node_address: NodeAddress) -> Self {
        Self {
            store,
            node_address,
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Address this ledger acquires locks for.
    #[must_use]
    pub fn node_address(&self) -> &NodeAddress {
        &self.node_address
    }

    /// Value written into this node's liveness marker.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        self.instance_id.as_str()
    }

    /// Acquires the partition lock when free, otherwise returns its holder.
    ///
    /// Acquisition and lookup are one atomic store call, so no other node can
    /// slip in between "the lock is free" and "the lock is mine".
    pub async fn try_acquire_or_locate(
        &self,
        partition_key: &PartitionKey,
        lease: LeaseDuration,
    ) -> AppResult<NodeAddress> {
        let label = partition_key.label();
        let outcome = self
            .store
            .set_if_absent_else_get(
                label.as_str(),
                self.node_address.as_str(),
                lease.as_duration(),
            )
            .await?;

        if outcome.was_new {
            debug!(partition = %label, "partition lock acquired");
            return Ok(self.node_address.clone());
        }

        NodeAddress::parse(outcome.value.as_str()).map_err(|error| {
            AppError::Internal(format!(
                "partition lock '{label}' holds an unusable owner '{}': {error}",
                outcome.value
            ))
        })
    }

    /// Extends the lock TTL to at least `lease` from now, never shortening it.
    pub async fn extend_lease(&self, label: &PartitionLabel, lease: LeaseDuration) -> AppResult<()> {
        self.store
            .extend_ttl_if_greater(label.as_str(), lease.as_duration())
            .await
    }

    /// Deletes the lock if this node still holds it.
    ///
    /// Returns `false` when the lease ran out and the lock now belongs to
    /// someone else (or nobody); that lock is left untouched.
    pub async fn release(&self, label: &PartitionLabel) -> AppResult<bool> {
        let released = self
            .store
            .compare_and_delete(label.as_str(), self.node_address.as_str())
            .await?;
        if released {
            debug!(partition = %label, "partition lock released");
        } else {
            debug!(partition = %label, "partition lock already passed on; nothing to release");
        }
        Ok(released)
    }

    /// Deletes one batch of locks still held by this node.
    pub async fn release_batch(&self, labels: &[PartitionLabel]) -> AppResult<u64> {
        if labels.len() > BULK_DELETE_BATCH_SIZE {
            return Err(AppError::Validation(format!(
                "release batch of {} exceeds the limit of {BULK_DELETE_BATCH_SIZE} keys",
                labels.len()
            )));
        }

        if labels.is_empty() {
            return Ok(0);
        }

        let keys: Vec<String> = labels.iter().map(|label| label.as_str().to_owned()).collect();
        self.store
            .bulk_compare_and_delete(&keys, self.node_address.as_str())
            .await
    }

    /// Whether `node` currently has a liveness marker.
    pub async fn is_alive(&self, node: &NodeAddress) -> AppResult<bool> {
        let marker = self.store.get(node.service_label().as_str()).await?;
        Ok(marker.is_some())
    }

    /// Deletes the lock only if `expected_owner` still holds it.
    ///
    /// Returns `false` when the lock changed hands or vanished in the meantime;
    /// callers must then decide ownership again from scratch.
    pub async fn reclaim_if_still_owned_by(
        &self,
        label: &PartitionLabel,
        expected_owner: &NodeAddress,
    ) -> AppResult<bool> {
        self.store
            .compare_and_delete(label.as_str(), expected_owner.as_str())
            .await
    }

    /// Upserts this node's liveness marker with a fresh TTL.
    pub async fn publish_liveness(&self, ttl: Duration) -> AppResult<()> {
        self.store
            .set_with_ttl(
                self.node_address.service_label().as_str(),
                self.instance_id.as_str(),
                ttl,
            )
            .await
    }

    /// Deletes this instance's liveness marker if it is still the one it wrote.
    pub async fn clear_liveness(&self) -> AppResult<bool> {
        self.store
            .compare_and_delete(
                self.node_address.service_label().as_str(),
                self.instance_id.as_str(),
            )
            .await
    }
}
