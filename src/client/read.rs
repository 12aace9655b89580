// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Read strategies: pass-through, mutex-guarded pass-through, logical expiry.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, warn};

use crate::codec::{self, Cached, ABSENT_MARKER};
use crate::error::{CacheError, LoaderError};
use crate::metrics::{self, LOGICAL_EXPIRE, MUTEX, PASS_THROUGH};

use super::{store_key, CacheClient};

/// What the store holds for a physical-expiry key.
enum Lookup<T> {
    Hit(T),
    Absent,
    Miss,
}

impl<T> Lookup<T> {
    fn outcome(&self) -> &'static str {
        match self {
            Lookup::Hit(_) => "hit",
            Lookup::Absent => "absent",
            Lookup::Miss => "miss",
        }
    }
}

impl CacheClient {
    // ═══════════════════════════════════════════════════════════════════════════
    // Pass-through: absent markers stop penetration
    // ═══════════════════════════════════════════════════════════════════════════

    /// Read `prefix + id`, filling from `loader` on a miss.
    ///
    /// - hit → decoded value, loader not called
    /// - absent marker → `None`, loader not called
    /// - miss (or undecodable entry) → loader; `Some` is cached for `ttl`,
    ///   `None` caches the absent marker for `null_ttl`
    ///
    /// Loader errors are returned as [`CacheError::Loader`] and nothing is
    /// cached.
    pub async fn query_pass_through<ID, T, F, Fut>(
        &self,
        prefix: &str,
        id: ID,
        loader: F,
        ttl: Duration,
    ) -> Result<Option<T>, CacheError>
    where
        ID: Display,
        T: Serialize + DeserializeOwned,
        F: FnOnce(ID) -> Fut,
        Fut: Future<Output = Result<Option<T>, LoaderError>>,
    {
        let key = store_key(prefix, &id);

        let found = self.lookup::<T>(&key).await?;
        metrics::record_lookup(PASS_THROUGH, found.outcome());
        match found {
            Lookup::Hit(value) => return Ok(Some(value)),
            Lookup::Absent => return Ok(None),
            Lookup::Miss => {}
        }

        self.load_and_store(&key, id, loader, ttl, PASS_THROUGH).await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Mutex: one loader per key, everyone else polls
    // ═══════════════════════════════════════════════════════════════════════════

    /// Like [`query_pass_through`](Self::query_pass_through), but only the
    /// caller holding `lock:<key>` runs the loader. Others sleep
    /// `lock_retry_backoff` and read again, until the value appears or
    /// `lock_wait_timeout` passes ([`CacheError::Timeout`]).
    ///
    /// The lock is released whether the loader succeeds or fails.
    pub async fn query_with_mutex<ID, T, F, Fut>(
        &self,
        prefix: &str,
        id: ID,
        loader: F,
        ttl: Duration,
    ) -> Result<Option<T>, CacheError>
    where
        ID: Display,
        T: Serialize + DeserializeOwned,
        F: FnOnce(ID) -> Fut,
        Fut: Future<Output = Result<Option<T>, LoaderError>>,
    {
        let key = store_key(prefix, &id);
        let backoff = self.config.lock_retry_backoff();
        let wait_limit = self.config.lock_wait_timeout();
        let started = Instant::now();

        loop {
            let found = self.lookup::<T>(&key).await?;
            metrics::record_lookup(MUTEX, found.outcome());
            match found {
                Lookup::Hit(value) => return Ok(Some(value)),
                Lookup::Absent => return Ok(None),
                Lookup::Miss => {}
            }

            if self.lock.try_acquire(&key).await? {
                break;
            }
            metrics::record_lock_contention(MUTEX);

            let waited = started.elapsed();
            if waited >= wait_limit {
                metrics::record_lock_timeout();
                warn!("Gave up waiting for rebuild lock on '{}' after {:?}", key, waited);
                return Err(CacheError::Timeout { key, waited });
            }
            debug!("Lock on '{}' held elsewhere, retrying in {:?}", key, backoff);
            sleep(backoff).await;
        }

        self.lock
            .release_after(&key, async {
                // The previous holder may have filled the key between our
                // miss and our acquire.
                match self.lookup::<T>(&key).await {
                    Ok(Lookup::Hit(value)) => Ok(Some(value)),
                    Ok(Lookup::Absent) => Ok(None),
                    Ok(Lookup::Miss) => self.load_and_store(&key, id, loader, ttl, MUTEX).await,
                    Err(e) => Err(e),
                }
            })
            .await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Logical expiry: never block, rebuild in the background
    // ═══════════════════════════════════════════════════════════════════════════

    /// Read a logically-expiring entry written by
    /// [`set_with_logical_expire`](Self::set_with_logical_expire) or
    /// [`warm_logical`](Self::warm_logical).
    ///
    /// Never calls `loader` inline:
    /// - no entry → `None` (keys are expected to be pre-warmed)
    /// - fresh → payload
    /// - expired → the stale payload, and if `lock:<key>` is free a rebuild
    ///   is queued on the [`RebuildScheduler`](crate::RebuildScheduler)
    /// - undecodable → `None`, and a rebuild is queued to repair the entry
    pub async fn query_with_logical_expire<ID, T, F, Fut>(
        &self,
        prefix: &str,
        id: ID,
        loader: F,
        ttl: Duration,
    ) -> Result<Option<T>, CacheError>
    where
        ID: Display + Send + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(ID) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, LoaderError>> + Send + 'static,
    {
        let key = store_key(prefix, &id);

        let raw = self.store.get(&key).await.map_err(|e| {
            metrics::record_store_error("get");
            CacheError::from(e)
        })?;
        let Some(raw) = raw.filter(|r| r.as_str() != ABSENT_MARKER) else {
            metrics::record_lookup(LOGICAL_EXPIRE, "miss");
            return Ok(None);
        };

        let entry = match codec::decode_envelope::<T>(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                metrics::record_lookup(LOGICAL_EXPIRE, "corrupt");
                warn!("{}", CacheError::corrupt(&key, e));
                self.schedule_rebuild(key, id, loader, ttl).await;
                return Ok(None);
            }
        };

        if !entry.is_expired() {
            metrics::record_lookup(LOGICAL_EXPIRE, "hit");
            return Ok(Some(entry.data));
        }

        metrics::record_lookup(LOGICAL_EXPIRE, "stale");
        debug!("'{}' logically expired at {}, serving stale", key, entry.expire_at);
        self.schedule_rebuild(key, id, loader, ttl).await;
        Ok(Some(entry.data))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Shared steps
    // ═══════════════════════════════════════════════════════════════════════════

    /// Read and decode a physical-expiry key. Corrupt entries count as a miss.
    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Result<Lookup<T>, CacheError> {
        let raw = self.store.get(key).await.map_err(|e| {
            metrics::record_store_error("get");
            CacheError::from(e)
        })?;
        let Some(raw) = raw else {
            return Ok(Lookup::Miss);
        };
        match codec::decode::<T>(&raw) {
            Ok(Cached::Value(value)) => Ok(Lookup::Hit(value)),
            Ok(Cached::Absent) => Ok(Lookup::Absent),
            Err(e) => {
                warn!("{}; reloading from source", CacheError::corrupt(key, e));
                Ok(Lookup::Miss)
            }
        }
    }

    async fn load_and_store<ID, T, F, Fut>(
        &self,
        key: &str,
        id: ID,
        loader: F,
        ttl: Duration,
        strategy: &'static str,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize,
        F: FnOnce(ID) -> Fut,
        Fut: Future<Output = Result<Option<T>, LoaderError>>,
    {
        let started = Instant::now();
        let loaded = loader(id).await;
        metrics::record_loader_call(strategy, started.elapsed());

        match loaded.map_err(|e| CacheError::loader(key, e))? {
            None => {
                debug!("'{}' absent from source, caching marker for {:?}", key, self.config.null_ttl());
                self.store
                    .set(key, ABSENT_MARKER, Some(self.config.null_ttl()))
                    .await
                    .map_err(|e| {
                        metrics::record_store_error("set");
                        CacheError::from(e)
                    })?;
                Ok(None)
            }
            Some(value) => {
                let raw = codec::encode(&value).map_err(|e| CacheError::encode(key, e))?;
                self.store
                    .set(key, &raw, Some(self.config.jittered(ttl)))
                    .await
                    .map_err(|e| {
                        metrics::record_store_error("set");
                        CacheError::from(e)
                    })?;
                Ok(Some(value))
            }
        }
    }

    /// Take `lock:<key>` and queue a rebuild. Does nothing if the lock is
    /// held. Failures are logged: the caller already has a value to return.
    async fn schedule_rebuild<ID, T, F, Fut>(&self, key: String, id: ID, loader: F, ttl: Duration)
    where
        ID: Send + 'static,
        T: Serialize + Send + 'static,
        F: FnOnce(ID) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, LoaderError>> + Send + 'static,
    {
        match self.lock.try_acquire(&key).await {
            Ok(true) => {}
            Ok(false) => {
                metrics::record_lock_contention(LOGICAL_EXPIRE);
                debug!("Rebuild of '{}' already in flight", key);
                return;
            }
            Err(e) => {
                metrics::record_store_error("set_if_absent");
                warn!("Could not take rebuild lock on '{}': {}", key, e);
                return;
            }
        }

        let client = self.clone();
        let task_key = key.clone();
        let task = async move { client.rebuild(task_key, id, loader, ttl).await };

        if let Err(e) = self.scheduler.submit(task) {
            metrics::record_rebuild("rejected");
            warn!("Rebuild of '{}' not queued: {}", key, e);
            if let Err(e) = self.lock.release(&key).await {
                warn!("Failed to release lock on '{}': {}", key, e);
            }
        }
    }

    /// Runs on a rebuild worker. Loader failures and panics leave the stale
    /// entry in place; the lock is always released.
    async fn rebuild<ID, T, F, Fut>(self, key: String, id: ID, loader: F, ttl: Duration)
    where
        ID: Send + 'static,
        T: Serialize + Send + 'static,
        F: FnOnce(ID) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, LoaderError>> + Send + 'static,
    {
        let lock = self.lock.clone();
        lock.release_after(&key, async {
            let started = Instant::now();
            // Own task so a panicking loader still reaches the release below
            let loaded = tokio::spawn(async move { loader(id).await }).await;
            metrics::record_loader_call(LOGICAL_EXPIRE, started.elapsed());

            match loaded {
                Err(e) => {
                    metrics::record_rebuild("error");
                    error!("Rebuild loader for '{}' panicked: {}", key, e);
                }
                Ok(Err(e)) => {
                    metrics::record_rebuild("error");
                    error!("Rebuild loader for '{}' failed, keeping stale entry: {}", key, e);
                }
                Ok(Ok(None)) => {
                    metrics::record_rebuild("absent");
                    warn!("Source has no record for '{}', keeping stale entry", key);
                }
                Ok(Ok(Some(value))) => {
                    let encoded = codec::encode_with_logical_expiry(&value, ttl);
                    let written = match encoded {
                        Ok(raw) => self.put_raw(&key, &raw, None).await,
                        Err(e) => Err(CacheError::encode(&key, e)),
                    };
                    match written {
                        Ok(()) => {
                            metrics::record_rebuild("ok");
                            debug!("Rebuilt '{}'", key);
                        }
                        Err(e) => {
                            metrics::record_rebuild("error");
                            error!("Rebuild of '{}' could not write: {}", key, e);
                        }
                    }
                }
            }
        })
        .await
    }
}
