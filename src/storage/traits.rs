// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Storage connection error: {0}")]
    Connection(String),
}

/// String key-value primitives the cache layer is built on.
///
/// Every coordination decision (absent markers, locks, logical expiry) is
/// expressed through these calls, so any two processes sharing a backend
/// see the same state.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a raw value. `Ok(None)` means the key does not exist (or has
    /// physically expired).
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value unconditionally. `ttl: None` stores without expiry and
    /// clears any previous expiry on the key.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StorageError>;

    /// Write only if the key is absent. Returns `true` if this call created it.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StorageError>;

    /// Remove a key. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Set a new TTL on an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StorageError>;

    /// Remaining TTL. `Ok(None)` when the key is absent or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }
}
