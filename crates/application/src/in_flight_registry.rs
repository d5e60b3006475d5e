use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use stickyroute_core::{AppError, AppResult};
use stickyroute_domain::PartitionLabel;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::coordination_ports::BULK_DELETE_BATCH_SIZE;
use crate::ownership_ledger::OwnershipLedger;

#[derive(Debug, Default)]
struct RegistryState {
    holders: HashMap<PartitionLabel, usize>,
    gates: HashMap<PartitionLabel, Arc<AsyncMutex<()>>>,
    closed: bool,
}

/// Serializes one partition's local hand-over steps on this node.
///
/// While held, no other local request of the same partition can take or give
/// back the store lock, so "acquire and track" and "untrack and release"
/// never interleave.
#[derive(Debug)]
pub struct PartitionGuard {
    label: PartitionLabel,
    gate: Arc<AsyncMutex<()>>,
    held: OwnedMutexGuard<()>,
}

/// Partition locks currently held by this node's in-progress requests.
///
/// The mutex guards the mapping, the per-partition gates and the closed flag
/// and is never held across a store call. Gates are async and are held
/// across store calls.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    state: Mutex<RegistryState>,
}

impl InFlightRegistry {
    /// Creates an empty, open registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one more local request holding `label`.
    pub fn track(&self, label: &PartitionLabel) -> AppResult<()> {
        let mut state = self.state();
        if state.closed {
            return Err(AppError::Unavailable(
                "proxy instance is closed and no longer acquires partitions".to_owned(),
            ));
        }

        *state.holders.entry(label.clone()).or_default() += 1;
        Ok(())
    }

    /// Records that one local request stopped holding `label`.
    ///
    /// Returns `true` when it was the last local holder, i.e. the caller
    /// should release the store lock. Labels already drained return `false`.
    pub fn untrack(&self, label: &PartitionLabel) -> bool {
        let mut state = self.state();
        let Some(holders) = state.holders.get_mut(label) else {
            return false;
        };

        *holders = holders.saturating_sub(1);
        if *holders == 0 {
            state.holders.remove(label);
            return true;
        }

        false
    }

    /// Waits for exclusive use of `label`'s hand-over steps on this node.
    pub async fn lock_partition(&self, label: &PartitionLabel) -> PartitionGuard {
        let gate = Arc::clone(self.state().gates.entry(label.clone()).or_default());
        let held = Arc::clone(&gate).lock_owned().await;
        PartitionGuard {
            label: label.clone(),
            gate,
            held,
        }
    }

    /// Gives the gate back and forgets it once nobody tracks or waits on it.
    pub fn unlock_partition(&self, guard: PartitionGuard) {
        let PartitionGuard { label, gate, held } = guard;
        drop(held);

        let mut state = self.state();
        // The map and `gate` are the only references left when nobody waits.
        if !state.holders.contains_key(&label) && Arc::strong_count(&gate) == 2 {
            state.gates.remove(&label);
        }
    }

    /// Whether [`InFlightRegistry::drain_all`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Number of distinct labels currently tracked.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.state().holders.len()
    }

    /// Closes the registry and deletes every lock it still tracks.
    ///
    /// Deletion happens outside the mutex in batches of at most
    /// [`BULK_DELETE_BATCH_SIZE`] keys. Every batch is attempted; the first
    /// failure is returned afterwards. Returns the number of labels drained.
    pub async fn drain_all(&self, ledger: &OwnershipLedger) -> AppResult<usize> {
        let mut labels: Vec<PartitionLabel> = {
            let mut state = self.state();
            state.closed = true;
            std::mem::take(&mut state.holders).into_keys().collect()
        };
        labels.sort();

        let mut first_error = None;
        for batch in labels.chunks(BULK_DELETE_BATCH_SIZE) {
            if let Err(error) = ledger.release_batch(batch).await {
                warn!(batch_size = batch.len(), error = %error, "failed to release partition locks on close");
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }

        info!(released = labels.len(), "released partition locks held on close");
        Ok(labels.len())
    }
}
