//! Redis-backed coordination store.
//!
//! Requires Redis 7 or newer for `SET ... NX GET` and `PEXPIRE ... GT`.
//! Works against a single server or a Redis Cluster; batch deletes run as one
//! script on a single server and key by key on a cluster, where the keys of
//! one batch usually live in different slots.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::{FromRedisValue, RedisResult, Script, ScriptInvocation};
use stickyroute_application::{CoordinationStore, SetIfAbsentOutcome};
use stickyroute_core::{AppError, AppResult};


const COMPARE_AND_DELETE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

const BULK_COMPARE_AND_DELETE_SCRIPT: &str = r#"
local deleted = 0
for _, key in ipairs(KEYS) do
  if redis.call('GET', key) == ARGV[1] then
    deleted = deleted + redis.call('DEL', key)
  end
end
return deleted
"#;

#[derive(Clone)]
enum RedisConnection {
    Standalone(ConnectionManager),
    Cluster(ClusterConnection),
}

impl RedisConnection {
    async fn query<T: FromRedisValue>(&self, command: &redis::Cmd) -> RedisResult<T> {
        match self {
            Self::Standalone(connection) => command.query_async(&mut connection.clone()).await,
            Self::Cluster(connection) => command.query_async(&mut connection.clone()).await,
        }
    }

    async fn invoke<T: FromRedisValue>(&self, invocation: &ScriptInvocation<'_>) -> RedisResult<T> {
        match self {
            Self::Standalone(connection) => invocation.invoke_async(&mut connection.clone()).await,
            Self::Cluster(connection) => invocation.invoke_async(&mut connection.clone()).await,
        }
    }
}

/// Redis implementation of the coordination store port.
///
/// Holds one shared connection that reconnects on its own; clones share it.
#[derive(Clone)]
pub struct RedisCoordinationStore {
    connection: RedisConnection,
    key_prefix: String,
}

impl RedisCoordinationStore {
    /// Connects to a single Redis server. An empty `key_prefix` leaves keys
    /// unchanged.
    pub async fn connect(client: redis::Client, key_prefix: impl Into<String>) -> AppResult<Self> {
        let connection = client.get_connection_manager().await.map_err(|error| {
            AppError::StoreUnavailable(format!("failed to connect to redis: {error}"))
        })?;

        Ok(Self {
            connection: RedisConnection::Standalone(connection),
            key_prefix: key_prefix.into(),
        })
    }

    /// Connects to a Redis Cluster through any of its seed nodes.
    pub async fn connect_cluster(
        client: ClusterClient,
        key_prefix: impl Into<String>,
    ) -> AppResult<Self> {
        let connection = client.get_async_connection().await.map_err(|error| {
            AppError::StoreUnavailable(format!("failed to connect to redis cluster: {error}"))
        })?;

        Ok(Self {
            connection: RedisConnection::Cluster(connection),
            key_prefix: key_prefix.into(),
        })
    }

    fn key_for(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_owned()
        } else {
            format!("{}:{key}", self.key_prefix)
        }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn set_if_absent_else_get(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> AppResult<SetIfAbsentOutcome> {
        let mut command = redis::cmd("SET");
        command
            .arg(self.key_for(key))
            .arg(value)
            .arg("NX")
            .arg("GET")
            .arg("PX")
            .arg(ttl_millis(ttl));

        let previous: Option<String> = self
            .connection
            .query(&command)
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!("failed to acquire key '{key}': {error}"))
            })?;

        Ok(match previous {
            Some(current) => SetIfAbsentOutcome {
                value: current,
                was_new: false,
            },
            None => SetIfAbsentOutcome {
                value: value.to_owned(),
                was_new: true,
            },
        })
    }

    async fn extend_ttl_if_greater(&self, key: &str, ttl: Duration) -> AppResult<()> {
        let mut command = redis::cmd("PEXPIRE");
        command.arg(self.key_for(key)).arg(ttl_millis(ttl)).arg("GT");

        self.connection
            .query::<i64>(&command)
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!("failed to extend ttl of '{key}': {error}"))
            })?;

        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut command = redis::cmd("GET");
        command.arg(self.key_for(key));

        self.connection
            .query(&command)
            .await
            .map_err(|error| AppError::StoreUnavailable(format!("failed to read '{key}': {error}")))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> AppResult<bool> {
        let script = Script::new(COMPARE_AND_DELETE_SCRIPT);
        let mut invocation = script.prepare_invoke();
        invocation.key(self.key_for(key)).arg(expected);

        let deleted = self
            .connection
            .invoke::<i64>(&invocation)
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!("failed to compare-and-delete '{key}': {error}"))
            })?;

        Ok(deleted > 0)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut command = redis::cmd("SET");
        command
            .arg(self.key_for(key))
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl));

        self.connection
            .query::<()>(&command)
            .await
            .map_err(|error| AppError::StoreUnavailable(format!("failed to write '{key}': {error}")))
    }

    async fn bulk_compare_and_delete(&self, keys: &[String], expected: &str) -> AppResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        if matches!(self.connection, RedisConnection::Cluster(_)) {
            let mut deleted = 0_u64;
            for key in keys {
                if self.compare_and_delete(key, expected).await? {
                    deleted += 1;
                }
            }
            return Ok(deleted);
        }

        let script = Script::new(BULK_COMPARE_AND_DELETE_SCRIPT);
        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(self.key_for(key));
        }
        invocation.arg(expected);

        self.connection
            .invoke::<u64>(&invocation)
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!("failed to delete {} keys: {error}", keys.len()))
            })
    }
}
