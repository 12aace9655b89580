// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Best-effort, self-expiring mutex keyed by cache key.
//!
//! Acquisition is a single `SET lock:<key> 1 NX PX <ttl>`. Whoever created
//! the key holds the lock; there is no owner token, so any caller may
//! release it. If a holder dies before releasing, the lease runs out and
//! the next caller takes over.
//!
//! The lease trades strict exclusion for liveness: a rebuild that outlives
//! `lock_ttl` can overlap with a second one, and the last write wins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::storage::traits::{KvStore, StorageError};

const LOCK_VALUE: &str = "1";
/// Shortest lease handed to the store. A zero lease would be stored already
/// expired and exclude no one.
const MIN_LEASE: Duration = Duration::from_millis(1);

#[derive(Clone)]
pub struct MutexLock {
    store: Arc<dyn KvStore>,
    prefix: String,
    ttl: Duration,
}

impl MutexLock {
    pub fn new(store: Arc<dyn KvStore>, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            ttl: ttl.max(MIN_LEASE),
        }
    }

    /// The lock key guarding `key`.
    #[must_use]
    pub fn lock_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns `true` if this call took the lock. `false` means someone else
    /// is already rebuilding `key`; that is not an error.
    pub async fn try_acquire(&self, key: &str) -> Result<bool, StorageError> {
        let acquired = self
            .store
            .set_if_absent(&self.lock_key(key), LOCK_VALUE, self.ttl)
            .await?;
        debug!("Lock on '{}' {}", key, if acquired { "acquired" } else { "contended" });
        Ok(acquired)
    }

    pub async fn release(&self, key: &str) -> Result<(), StorageError> {
        self.store.delete(&self.lock_key(key)).await?;
        Ok(())
    }

    /// Take ownership of an already-acquired lock on `key`. The returned
    /// guard releases it when dropped.
    #[must_use]
    pub fn guard(&self, key: &str) -> LockGuard {
        LockGuard {
            lock: self.clone(),
            key: key.to_string(),
            released: false,
        }
    }

    /// Run `work` while holding the lock on `key`, then release it whatever
    /// `work` returned. The caller must already hold the lock.
    ///
    /// If `work` panics or this future is dropped before completing, the
    /// guard's `Drop` queues the release on the current runtime instead.
    pub async fn release_after<F, T>(&self, key: &str, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let guard = self.guard(key);
        let result = work.await;
        guard.release().await;
        result
    }
}

/// Releases a held lock on drop.
///
/// Prefer [`release`](LockGuard::release) on the normal path; `Drop` cannot
/// await, so it spawns the delete on the current tokio runtime. Outside a
/// runtime the lease is left to expire.
pub struct LockGuard {
    lock: MutexLock,
    key: String,
    released: bool,
}

impl LockGuard {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release now. A failed release is logged, not returned: the lease
    /// expires on its own.
    pub async fn release(mut self) {
        if let Err(e) = self.lock.release(&self.key).await {
            warn!(
                "Failed to release lock on '{}' (expires in {:?}): {}",
                self.key, self.lock.ttl, e
            );
        }
        self.released = true;
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let lock = self.lock.clone();
        let key = self.key.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Lock on '{}' dropped while held, releasing in background", key);
                handle.spawn(async move {
                    if let Err(e) = lock.release(&key).await {
                        warn!("Failed to release lock on '{}' (expires in {:?}): {}", key, lock.ttl, e);
                    }
                });
            }
            Err(_) => {
                warn!("No runtime to release lock on '{}', lease expires in {:?}", key, lock.ttl);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStore;

    fn lock_with(store: Arc<InMemoryStore>) -> MutexLock {
        MutexLock::new(store, "lock:", Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_lock_key() {
        let lock = lock_with(Arc::new(InMemoryStore::new()));
        assert_eq!(lock.lock_key("cache:shop:1"), "lock:cache:shop:1");
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive_until_release() {
        let store = Arc::new(InMemoryStore::new());
        let lock = lock_with(store.clone());

        assert!(lock.try_acquire("cache:shop:1").await.unwrap());
        assert!(!lock.try_acquire("cache:shop:1").await.unwrap());
        assert!(lock.try_acquire("cache:shop:2").await.unwrap());

        lock.release("cache:shop:1").await.unwrap();
        assert!(lock.try_acquire("cache:shop:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_written_with_lease() {
        let store = Arc::new(InMemoryStore::new());
        let lock = lock_with(store.clone());

        lock.try_acquire("k").await.unwrap();
        assert_eq!(store.get("lock:k").await.unwrap().as_deref(), Some("1"));
        let ttl = store.ttl("lock:k").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(10));
        assert!(ttl > Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_crashed_holder_self_heals() {
        let store = Arc::new(InMemoryStore::new());
        let lock = lock_with(store);

        assert!(lock.try_acquire("k").await.unwrap());
        // holder never releases
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(lock.try_acquire("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_is_unconditional() {
        let store = Arc::new(InMemoryStore::new());
        let holder = lock_with(store.clone());
        let other = lock_with(store);

        assert!(holder.try_acquire("k").await.unwrap());
        other.release("k").await.unwrap();
        assert!(other.try_acquire("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_after_releases_on_error() {
        let store = Arc::new(InMemoryStore::new());
        let lock = lock_with(store.clone());

        assert!(lock.try_acquire("k").await.unwrap());
        let result: Result<(), &str> = lock.release_after("k", async { Err("loader failed") }).await;

        assert_eq!(result, Err("loader failed"));
        assert!(!store.exists("lock:k").await.unwrap());
    }

    async fn wait_until_released(store: &InMemoryStore, key: &str) -> bool {
        for _ in 0..100 {
            if !store.exists(key).await.unwrap() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_dropped_guard_releases() {
        let store = Arc::new(InMemoryStore::new());
        let lock = lock_with(store.clone());

        assert!(lock.try_acquire("k").await.unwrap());
        let guard = lock.guard("k");
        assert_eq!(guard.key(), "k");
        drop(guard);

        assert!(wait_until_released(&store, "lock:k").await);
    }

    #[tokio::test]
    async fn test_release_after_releases_when_cancelled() {
        let store = Arc::new(InMemoryStore::new());
        let lock = lock_with(store.clone());

        assert!(lock.try_acquire("k").await.unwrap());
        let slow = lock.release_after("k", tokio::time::sleep(Duration::from_secs(5)));
        let timed_out = tokio::time::timeout(Duration::from_millis(20), slow).await;

        assert!(timed_out.is_err());
        assert!(wait_until_released(&store, "lock:k").await);
    }

    #[tokio::test]
    async fn test_release_after_releases_on_panic() {
        let store = Arc::new(InMemoryStore::new());
        let lock = lock_with(store.clone());

        assert!(lock.try_acquire("k").await.unwrap());
        let holder = lock.clone();
        let handle = tokio::spawn(async move {
            holder
                .release_after("k", async {
                    panic!("work blew up");
                })
                .await
        });

        assert!(handle.await.unwrap_err().is_panic());
        assert!(wait_until_released(&store, "lock:k").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_lease_still_excludes() {
        let store = Arc::new(InMemoryStore::new());
        let lock = MutexLock::new(store, "lock:", Duration::ZERO);

        assert_eq!(lock.ttl(), MIN_LEASE);
        assert!(lock.try_acquire("k").await.unwrap());
        assert!(!lock.try_acquire("k").await.unwrap());
    }
}
