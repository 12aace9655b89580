// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis storage backend.
//!
//! Values are plain Redis strings. TTLs are written with millisecond
//! precision (`PX` / `PEXPIRE` / `PTTL`) so short locks and absent markers
//! behave the same as in [`InMemoryStore`](super::memory::InMemoryStore).
//!
//! Per-operation failures are returned as-is and never retried here: a
//! cache that silently retries a dead backend hides outages from callers.
//! Only the initial connection uses [`RetryConfig::startup`].

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, AsyncCommands, Client};

use super::traits::{KvStore, StorageError};
use crate::resilience::retry::{retry, RetryConfig};

pub struct RedisStore {
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g., "myapp:" → "myapp:cache:shop:1")
    prefix: String,
}

impl RedisStore {
    /// Create a new Redis store without a key prefix.
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        Self::with_prefix(connection_string, None).await
    }

    /// Create a new Redis store with an optional key prefix.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use cache_aside::storage::redis::RedisStore;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// // Keys will be prefixed: "myapp:cache:shop:1", "myapp:lock:cache:shop:1"
    /// let store = RedisStore::with_prefix("redis://localhost", Some("myapp:")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_prefix(connection_string: &str, prefix: Option<&str>) -> Result<Self, StorageError> {
        let client = Client::open(connection_string)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Connection(e.to_string()))?;

        Ok(Self {
            connection,
            prefix: prefix.unwrap_or("").to_string(),
        })
    }

    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    /// Get the configured prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

fn backend(op: &str, key: &str, e: redis::RedisError) -> StorageError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        StorageError::Connection(format!("{} '{}': {}", op, key, e))
    } else {
        StorageError::Backend(format!("{} '{}': {}", op, key, e))
    }
}

/// Redis rejects a zero PX; round sub-millisecond TTLs up.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn
            .get(self.prefixed_key(key))
            .await
            .map_err(|e| backend("GET", key, e))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        let mut command = cmd("SET");
        command.arg(self.prefixed_key(key)).arg(value);
        if let Some(ttl) = ttl {
            command.arg("PX").arg(ttl_millis(ttl));
        }
        let _: () = command
            .query_async(&mut conn)
            .await
            .map_err(|e| backend("SET", key, e))?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StorageError> {
        let mut conn = self.connection.clone();
        // SET NX PX replies "OK" when written, nil when the key already existed
        let reply: Option<String> = cmd("SET")
            .arg(self.prefixed_key(key))
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| backend("SET NX", key, e))?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut conn = self.connection.clone();
        let removed: u32 = conn
            .del(self.prefixed_key(key))
            .await
            .map_err(|e| backend("DEL", key, e))?;
        Ok(removed > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StorageError> {
        let mut conn = self.connection.clone();
        let updated: bool = cmd("PEXPIRE")
            .arg(self.prefixed_key(key))
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| backend("PEXPIRE", key, e))?;
        Ok(updated)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StorageError> {
        let mut conn = self.connection.clone();
        // -2: no such key, -1: no expiry
        let millis: i64 = cmd("PTTL")
            .arg(self.prefixed_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| backend("PTTL", key, e))?;
        Ok((millis >= 0).then(|| Duration::from_millis(millis as u64)))
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let mut conn = self.connection.clone();
        let exists: bool = conn
            .exists(self.prefixed_key(key))
            .await
            .map_err(|e| backend("EXISTS", key, e))?;
        Ok(exists)
    }
}
