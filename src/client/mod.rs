// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache facade.
//!
//! The [`CacheClient`] composes the store, the [`MutexLock`] and the
//! [`RebuildScheduler`] into three read strategies and a write path:
//!
//! | strategy | cold key | hot-key miss storm | expiry |
//! |----------|----------|--------------------|--------|
//! | [`query_pass_through`](CacheClient::query_pass_through) | loader inline, absent marker on `None` | every caller loads | physical TTL |
//! | [`query_with_mutex`](CacheClient::query_with_mutex) | one caller loads, others poll | one load | physical TTL |
//! | [`query_with_logical_expire`](CacheClient::query_with_logical_expire) | `None` (pre-warm required) | never blocks | stale-while-rebuild |
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use cache_aside::{CacheClient, CacheConfig, InMemoryStore, RebuildScheduler};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), cache_aside::CacheError> {
//! let config = CacheConfig::default();
//! let scheduler = Arc::new(RebuildScheduler::from_config(&config));
//! let client = CacheClient::new(Arc::new(InMemoryStore::new()), scheduler, config);
//!
//! let name: Option<String> = client
//!     .query_pass_through("cache:shop:", 42, |id| async move {
//!         Ok(Some(format!("shop-{}", id)))
//!     }, Duration::from_secs(1800))
//!     .await?;
//! assert_eq!(name.as_deref(), Some("shop-42"));
//! # Ok(())
//! # }
//! ```

mod read;
mod write;

use std::fmt::Display;
use std::sync::Arc;

use tracing::warn;

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::lock::MutexLock;
use crate::rebuild::RebuildScheduler;
use crate::storage::redis::RedisStore;
use crate::storage::traits::{KvStore, StorageError};

/// Cache-aside client. Cheap to clone; clones share the store, lock and
/// scheduler.
#[derive(Clone)]
pub struct CacheClient {
    pub(super) store: Arc<dyn KvStore>,
    pub(super) lock: MutexLock,
    pub(super) scheduler: Arc<RebuildScheduler>,
    pub(super) config: Arc<CacheConfig>,
}

impl CacheClient {
    /// Build a client over an existing store. An invalid `config` is logged
    /// and used as given; the lock lease is floored at one millisecond.
    pub fn new(store: Arc<dyn KvStore>, scheduler: Arc<RebuildScheduler>, config: CacheConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!("Cache config is invalid, continuing anyway: {}", e);
        }
        let lock = MutexLock::new(store.clone(), config.lock_prefix.clone(), config.lock_ttl());
        Self {
            store,
            lock,
            scheduler,
            config: Arc::new(config),
        }
    }

    /// Connect to the Redis instance named by `config.redis_url`.
    pub async fn connect(config: CacheConfig, scheduler: Arc<RebuildScheduler>) -> Result<Self, CacheError> {
        config
            .validate()
            .map_err(|e| StorageError::Connection(format!("invalid config: {}", e)))?;
        let Some(url) = config.redis_url.as_deref() else {
            return Err(StorageError::Connection("redis_url not configured".to_string()).into());
        };
        let store = RedisStore::with_prefix(url, config.redis_prefix.as_deref()).await?;
        Ok(Self::new(Arc::new(store), scheduler, config))
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    #[must_use]
    pub fn lock(&self) -> &MutexLock {
        &self.lock
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<RebuildScheduler> {
        &self.scheduler
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

/// `prefix + id`, e.g. `"cache:shop:" + 42`.
#[must_use]
pub fn store_key(prefix: &str, id: &impl Display) -> String {
    format!("{}{}", prefix, id)
}
