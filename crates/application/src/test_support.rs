use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time::Instant;

use stickyroute_core::{AppError, AppResult};
use stickyroute_domain::{NodeAddress, PartitionKey};

use crate::coordination_ports::{CoordinationStore, SetIfAbsentOutcome};
use crate::forwarding_ports::{ForwardRequest, ForwardResponse, ForwardingTransport};

#[derive(Debug, Clone)]
struct FakeEntry {
    value: String,
    expires_at: Instant,
}

struct CallGate {
    reached: oneshot::Sender<()>,
    resume: oneshot::Receiver<()>,
}

/// A `set_if_absent_else_get` call held inside the fake store.
pub(crate) struct PausedAcquire {
    reached: oneshot::Receiver<()>,
    resume: oneshot::Sender<()>,
}

impl PausedAcquire {
    /// Waits until a caller is blocked in the held acquisition.
    pub(crate) async fn reached(&mut self) {
        let _ = (&mut self.reached).await;
    }

    pub(crate) fn resume(self) {
        let _ = self.resume.send(());
    }
}

/// Store fake with TTL semantics on the tokio clock.
#[derive(Default)]
pub(crate) struct FakeCoordinationStore {
    entries: Mutex<HashMap<String, FakeEntry>>,
    bulk_delete_batches: Mutex<Vec<usize>>,
    compare_and_delete_expectations: Mutex<Vec<String>>,
    unavailable: AtomicBool,
    extend_unavailable: AtomicBool,
    acquire_gate: Mutex<Option<CallGate>>,
}

impl FakeCoordinationStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub(crate) fn value_of(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Self::purge_expired(&mut entries, key);
        entries.get(key).map(|entry| entry.value.clone())
    }

    pub(crate) fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Self::purge_expired(&mut entries, key);
        entries
            .get(key)
            .map(|entry| entry.expires_at.saturating_duration_since(Instant::now()))
    }

    pub(crate) fn insert(&self, key: &str, value: &str, ttl: Duration) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.to_owned(),
                FakeEntry {
                    value: value.to_owned(),
                    expires_at: Instant::now() + ttl,
                },
            );
    }

    pub(crate) fn bulk_delete_batches(&self) -> Vec<usize> {
        self.bulk_delete_batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of compare-and-delete calls that expected `value` as the holder.
    pub(crate) fn compare_and_delete_calls_expecting(&self, value: &str) -> usize {
        self.compare_and_delete_expectations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|expected| expected.as_str() == value)
            .count()
    }

    /// Fails only `extend_ttl_if_greater` while set.
    pub(crate) fn set_extend_unavailable(&self, unavailable: bool) {
        self.extend_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Holds the next `set_if_absent_else_get` call, before it touches any
    /// key, until the returned [`PausedAcquire::resume`] is called.
    pub(crate) fn pause_next_acquire(&self) -> PausedAcquire {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (resume_tx, resume_rx) = oneshot::channel();
        *self.acquire_gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(CallGate {
            reached: reached_tx,
            resume: resume_rx,
        });

        PausedAcquire {
            reached: reached_rx,
            resume: resume_tx,
        }
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable(
                "fake store is offline".to_owned(),
            ));
        }

        Ok(())
    }

    fn purge_expired(entries: &mut HashMap<String, FakeEntry>, key: &str) {
        if entries
            .get(key)
            .is_some_and(|entry| entry.expires_at <= Instant::now())
        {
            entries.remove(key);
        }
    }
}

#[async_trait]
impl CoordinationStore for FakeCoordinationStore {
    async fn set_if_absent_else_get(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> AppResult<SetIfAbsentOutcome> {
        self.check_available()?;
        let gate = self
            .acquire_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(gate) = gate {
            let _ = gate.reached.send(());
            let _ = gate.resume.await;
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Self::purge_expired(&mut entries, key);

        if let Some(entry) = entries.get(key) {
            return Ok(SetIfAbsentOutcome {
                value: entry.value.clone(),
                was_new: false,
            });
        }

        entries.insert(
            key.to_owned(),
            FakeEntry {
                value: value.to_owned(),
                expires_at: Instant::now() + ttl,
            },
        );

        Ok(SetIfAbsentOutcome {
            value: value.to_owned(),
            was_new: true,
        })
    }

    async fn extend_ttl_if_greater(&self, key: &str, ttl: Duration) -> AppResult<()> {
        self.check_available()?;
        if self.extend_unavailable.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable(
                "fake store refused to extend".to_owned(),
            ));
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Self::purge_expired(&mut entries, key);

        if let Some(entry) = entries.get_mut(key) {
            let candidate = Instant::now() + ttl;
            if candidate > entry.expires_at {
                entry.expires_at = candidate;
            }
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.check_available()?;
        Ok(self.value_of(key))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> AppResult<bool> {
        self.check_available()?;
        self.compare_and_delete_expectations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(expected.to_owned());
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Self::purge_expired(&mut entries, key);

        if entries.get(key).is_some_and(|entry| entry.value == expected) {
            entries.remove(key);
            return Ok(true);
        }

        Ok(false)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.check_available()?;
        self.insert(key, value, ttl);
        Ok(())
    }

    async fn bulk_compare_and_delete(&self, keys: &[String], expected: &str) -> AppResult<u64> {
        self.check_available()?;
        self.bulk_delete_batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(keys.len());

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut deleted = 0_u64;
        for key in keys {
            Self::purge_expired(&mut entries, key);
            if entries.get(key).is_some_and(|entry| entry.value == expected) {
                entries.remove(key);
                deleted += 1;
            }
        }

        Ok(deleted)
    }
}

/// Transport fake answering every forward with `200` and the target in a header.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    targets: Mutex<Vec<String>>,
    unreachable: AtomicBool,
}

impl RecordingTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub(crate) fn targets(&self) -> Vec<String> {
        self.targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ForwardingTransport for RecordingTransport {
    async fn forward(
        &self,
        target: &NodeAddress,
        request: ForwardRequest,
    ) -> AppResult<ForwardResponse> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AppError::Forwarding(format!(
                "connection refused by '{target}'"
            )));
        }

        self.targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(target.as_str().to_owned());

        http::Response::builder()
            .status(http::StatusCode::OK)
            .header("x-served-by", target.as_str())
            .body(request.into_body())
            .map_err(|error| AppError::Internal(format!("invalid fake response: {error}")))
    }
}

pub(crate) fn node(raw: &str) -> NodeAddress {
    let address = NodeAddress::parse(raw);
    assert!(address.is_ok());
    address.unwrap_or_else(|_| unreachable!())
}

pub(crate) fn partition(raw: &str) -> PartitionKey {
    let key = PartitionKey::new(raw);
    assert!(key.is_ok());
    key.unwrap_or_else(|_| unreachable!())
}

pub(crate) fn request_for(partition_key: Option<&str>) -> ForwardRequest {
    let mut builder = http::Request::builder().method("GET").uri("/hello");
    if let Some(partition_key) = partition_key {
        builder = builder.header("X-Partition-Key", partition_key);
    }

    let request = builder.body(Vec::new());
    assert!(request.is_ok());
    request.unwrap_or_else(|_| unreachable!())
}
