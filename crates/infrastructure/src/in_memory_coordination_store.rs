use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use stickyroute_application::{CoordinationStore, SetIfAbsentOutcome};
use stickyroute_core::AppResult;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct StoreEntry {
    value: String,
    expires_at: Instant,
}

impl StoreEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Single-process coordination store for local runs and tests.
///
/// Every operation holds one lock for its whole duration, which makes each
/// call atomic the way the Redis commands are.
#[derive(Default)]
pub struct InMemoryCoordinationStore {
    entries: Mutex<HashMap<String, StoreEntry>>,
}

impl InMemoryCoordinationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

const MAX_TTL: Duration = Duration::from_secs(86_400 * 365 * 30);

fn expires_at(now: Instant, ttl: Duration) -> Instant {
    now + ttl.min(MAX_TTL)
}

fn live_entry<'a>(
    entries: &'a mut HashMap<String, StoreEntry>,
    key: &str,
    now: Instant,
) -> Option<&'a mut StoreEntry> {
    if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
        entries.remove(key);
    }

    entries.get_mut(key)
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn set_if_absent_else_get(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> AppResult<SetIfAbsentOutcome> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        if let Some(entry) = live_entry(&mut entries, key, now) {
            return Ok(SetIfAbsentOutcome {
                value: entry.value.clone(),
                was_new: false,
            });
        }

        entries.insert(
            key.to_owned(),
            StoreEntry {
                value: value.to_owned(),
                expires_at: expires_at(now, ttl),
            },
        );

        Ok(SetIfAbsentOutcome {
            value: value.to_owned(),
            was_new: true,
        })
    }

    async fn extend_ttl_if_greater(&self, key: &str, ttl: Duration) -> AppResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        if let Some(entry) = live_entry(&mut entries, key, now) {
            entry.expires_at = entry.expires_at.max(expires_at(now, ttl));
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        Ok(live_entry(&mut entries, key, now).map(|entry| entry.value.clone()))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> AppResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        if live_entry(&mut entries, key, now).is_some_and(|entry| entry.value == expected) {
            entries.remove(key);
            return Ok(true);
        }

        Ok(false)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let now = Instant::now();
        self.entries.lock().await.insert(
            key.to_owned(),
            StoreEntry {
                value: value.to_owned(),
                expires_at: expires_at(now, ttl),
            },
        );

        Ok(())
    }

    async fn bulk_compare_and_delete(&self, keys: &[String], expected: &str) -> AppResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let mut deleted = 0_u64;
        for key in keys {
            if live_entry(&mut entries, key, now).is_some_and(|entry| entry.value == expected) {
                entries.remove(key);
                deleted += 1;
            }
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use stickyroute_application::CoordinationStore;

    use super::InMemoryCoordinationStore;

    #[tokio::test]
    async fn only_one_concurrent_setter_wins() {
        let store = Arc::new(InMemoryCoordinationStore::new());

        let mut handles = Vec::new();
        for index in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .set_if_absent_else_get(
                        "partition:t1",
                        format!("http://node-{index}:3000").as_str(),
                        Duration::from_secs(30),
                    )
                    .await
            }));
        }

        let mut winners = Vec::new();
        let mut observed = Vec::new();
        for handle in handles {
            let outcome = handle.await;
            assert!(matches!(outcome, Ok(Ok(_))));
            let outcome = outcome
                .unwrap_or_else(|_| unreachable!())
                .unwrap_or_else(|_| unreachable!());
            if outcome.was_new {
                winners.push(outcome.value.clone());
            }
            observed.push(outcome.value);
        }

        assert_eq!(winners.len(), 1);
        assert!(observed.iter().all(|value| *value == winners[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_with_their_ttl() {
        let store = InMemoryCoordinationStore::new();
        assert!(
            store
                .set_with_ttl("service:http://a:3000", "instance-1", Duration::from_secs(3))
                .await
                .is_ok()
        );

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(
            store.get("service:http://a:3000").await,
            Ok(Some(ref value)) if value == "instance-1"
        ));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(store.get("service:http://a:3000").await, Ok(None)));
    }

    #[tokio::test(start_paused = true)]
    async fn extension_only_lengthens_the_ttl() {
        let store = InMemoryCoordinationStore::new();
        let acquired = store
            .set_if_absent_else_get("partition:t1", "http://a:3000", Duration::from_secs(10))
            .await;
        assert!(acquired.is_ok());

        assert!(
            store
                .extend_ttl_if_greater("partition:t1", Duration::from_secs(1))
                .await
                .is_ok()
        );
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(matches!(store.get("partition:t1").await, Ok(Some(_))));

        assert!(
            store
                .extend_ttl_if_greater("partition:t1", Duration::from_secs(20))
                .await
                .is_ok()
        );
        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(matches!(store.get("partition:t1").await, Ok(Some(_))));
    }

    #[tokio::test]
    async fn compare_and_delete_keeps_foreign_values() {
        let store = InMemoryCoordinationStore::new();
        assert!(
            store
                .set_with_ttl("partition:t1", "http://c:3000", Duration::from_secs(30))
                .await
                .is_ok()
        );

        let deleted = store
            .compare_and_delete("partition:t1", "http://a:3000")
            .await;

        assert!(matches!(deleted, Ok(false)));
        assert!(matches!(
            store.get("partition:t1").await,
            Ok(Some(ref value)) if value == "http://c:3000"
        ));
    }

    #[tokio::test]
    async fn bulk_compare_and_delete_skips_missing_and_foreign_keys() {
        let store = InMemoryCoordinationStore::new();
        for (key, owner) in [("partition:a", "http://a:3000"), ("partition:c", "http://c:3000")] {
            assert!(
                store
                    .set_with_ttl(key, owner, Duration::from_secs(30))
                    .await
                    .is_ok()
            );
        }

        let deleted = store
            .bulk_compare_and_delete(
                &[
                    "partition:a".to_owned(),
                    "partition:b".to_owned(),
                    "partition:c".to_owned(),
                ],
                "http://a:3000",
            )
            .await;

        assert!(matches!(deleted, Ok(1)));
        assert!(matches!(store.get("partition:a").await, Ok(None)));
        assert!(matches!(store.get("partition:c").await, Ok(Some(_))));
    }
}
