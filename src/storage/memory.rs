// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use super::traits::{KvStore, StorageError};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl.and_then(|t| Instant::now().checked_add(t)),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local [`KvStore`] with Redis-like expiry semantics.
///
/// Expired entries are dropped lazily on access. `set_if_absent` runs under
/// the shard lock of the key, so it is atomic with respect to other writers.
pub struct InMemoryStore {
    data: DashMap<String, StoredValue>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Number of stored keys, including ones that expired but were not yet touched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&self) {
        self.data.clear();
    }

    fn live(&self, key: &str) -> Option<StoredValue> {
        let now = Instant::now();
        let stored = self.data.get(key)?.value().clone();
        if stored.is_expired(now) {
            self.data.remove_if(key, |_, v| v.is_expired(now));
            return None;
        }
        Some(stored)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.live(key).map(|s| s.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StorageError> {
        self.data.insert(key.to_string(), StoredValue::new(value, ttl));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StorageError> {
        let now = Instant::now();
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(StoredValue::new(value, Some(ttl)));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue::new(value, Some(ttl)));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let now = Instant::now();
        Ok(self
            .data
            .remove(key)
            .is_some_and(|(_, v)| !v.is_expired(now)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StorageError> {
        let now = Instant::now();
        match self.data.get_mut(key) {
            Some(mut stored) if !stored.is_expired(now) => {
                stored.expires_at = now.checked_add(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StorageError> {
        let now = Instant::now();
        Ok(self
            .live(key)
            .and_then(|s| s.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.live(key).is_some())
    }
}
