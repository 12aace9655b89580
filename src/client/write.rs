// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Write path: direct sets, invalidation, pre-warming.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::{CacheError, LoaderError};
use crate::metrics::{self, LOGICAL_EXPIRE};

use super::{store_key, CacheClient};

impl CacheClient {
    /// Store `value` under `key` with a physical TTL. Overwrites whatever is
    /// there, including an absent marker.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
        let raw = codec::encode(value).map_err(|e| CacheError::encode(key, e))?;
        self.put_raw(key, &raw, Some(ttl)).await
    }

    /// Store `value` in a logical-expiration envelope expiring at
    /// `now + ttl`. The key itself never expires.
    pub async fn set_with_logical_expire<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let raw = codec::encode_with_logical_expiry(value, ttl).map_err(|e| CacheError::encode(key, e))?;
        self.put_raw(key, &raw, None).await
    }

    /// Delete `key`. Returns whether it existed.
    pub async fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        let existed = self.store.delete(key).await.map_err(|e| {
            metrics::record_store_error("delete");
            CacheError::from(e)
        })?;
        debug!("Invalidated '{}' (existed: {})", key, existed);
        Ok(existed)
    }

    /// Reset the physical TTL of `key`. Returns `false` if the key is gone.
    pub async fn touch(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.store.expire(key, ttl).await.map_err(|e| {
            metrics::record_store_error("expire");
            CacheError::from(e)
        })
    }

    /// Load `prefix + id` from the source and write it as a logical-expiry
    /// entry. Returns `false`, writing nothing, if the source has no record.
    ///
    /// Hot keys served by
    /// [`query_with_logical_expire`](Self::query_with_logical_expire) must be
    /// warmed this way (or with
    /// [`set_with_logical_expire`](Self::set_with_logical_expire)) first.
    pub async fn warm_logical<ID, T, F, Fut>(
        &self,
        prefix: &str,
        id: ID,
        loader: F,
        ttl: Duration,
    ) -> Result<bool, CacheError>
    where
        ID: Display,
        T: Serialize,
        F: FnOnce(ID) -> Fut,
        Fut: Future<Output = Result<Option<T>, LoaderError>>,
    {
        let key = store_key(prefix, &id);

        let started = Instant::now();
        let loaded = loader(id).await;
        metrics::record_loader_call(LOGICAL_EXPIRE, started.elapsed());

        match loaded.map_err(|e| CacheError::loader(&key, e))? {
            Some(value) => {
                self.set_with_logical_expire(&key, &value, ttl).await?;
                info!("Warmed '{}' (logical ttl {:?})", key, ttl);
                Ok(true)
            }
            None => {
                warn!("Cannot warm '{}': source has no record", key);
                Ok(false)
            }
        }
    }

    /// Run a source-of-truth write, then invalidate `key`.
    ///
    /// The source is updated first so a concurrent reader that refills the
    /// key after the delete sees the new row. If `write` fails the cache is
    /// left alone and [`CacheError::SourceWrite`] is returned.
    pub async fn update_and_invalidate<R, Fut>(&self, key: &str, write: Fut) -> Result<R, CacheError>
    where
        Fut: Future<Output = Result<R, LoaderError>>,
    {
        let result = write.await.map_err(|e| CacheError::SourceWrite {
            key: key.to_string(),
            source: e,
        })?;
        self.invalidate(key).await?;
        Ok(result)
    }

    pub(super) async fn put_raw(&self, key: &str, raw: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.store.set(key, raw, ttl).await.map_err(|e| {
            metrics::record_store_error("set");
            CacheError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::Deserialize;

    use crate::codec::{CacheEntry, Cached};
    use crate::config::CacheConfig;
    use crate::rebuild::RebuildScheduler;
    use crate::storage::memory::InMemoryStore;
    use crate::storage::traits::KvStore;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Shop {
        id: u64,
        name: String,
    }

    fn client() -> (CacheClient, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let scheduler = Arc::new(RebuildScheduler::new(1, 8));
        (CacheClient::new(store.clone(), scheduler, CacheConfig::default()), store)
    }

    #[tokio::test]
    async fn test_set_writes_payload_with_ttl() {
        let (client, store) = client();
        let shop = Shop { id: 1, name: "A".into() };

        client.set("cache:shop:1", &shop, Duration::from_secs(60)).await.unwrap();

        let raw = store.get("cache:shop:1").await.unwrap().unwrap();
        assert_eq!(codec::decode::<Shop>(&raw).unwrap(), Cached::Value(shop));
        let ttl = store.ttl("cache:shop:1").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(60));
        assert!(ttl > Duration::from_secs(59));
    }

    #[tokio::test]
    async fn test_set_with_logical_expire_has_no_store_ttl() {
        let (client, store) = client();

        client
            .set_with_logical_expire("cache:shop:1", &"hot", Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(store.ttl("cache:shop:1").await.unwrap(), None);
        let raw = store.get("cache:shop:1").await.unwrap().unwrap();
        let entry: CacheEntry<String> = codec::decode_envelope(&raw).unwrap();
        assert_eq!(entry.data, "hot");
        assert!(!entry.is_expired());
    }

    #[tokio::test]
    async fn test_invalidate_reports_existence() {
        let (client, _store) = client();
        client.set("k", &1, Duration::from_secs(60)).await.unwrap();

        assert!(client.invalidate("k").await.unwrap());
        assert!(!client.invalidate("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_touch() {
        let (client, store) = client();
        client.set("k", &1, Duration::from_secs(5)).await.unwrap();

        assert!(client.touch("k", Duration::from_secs(300)).await.unwrap());
        assert!(store.ttl("k").await.unwrap().unwrap() > Duration::from_secs(5));
        assert!(!client.touch("missing", Duration::from_secs(300)).await.unwrap());
    }

    #[tokio::test]
    async fn test_warm_logical() {
        let (client, store) = client();

        let warmed = client
            .warm_logical("cache:shop:", 7u64, |id| async move {
                Ok(Some(Shop { id, name: "warm".into() }))
            }, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(warmed);
        let raw = store.get("cache:shop:7").await.unwrap().unwrap();
        assert_eq!(codec::decode_envelope::<Shop>(&raw).unwrap().data.name, "warm");

        let warmed = client
            .warm_logical("cache:shop:", 8u64, |_| async { Ok(None::<Shop>) }, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!warmed);
        assert!(!store.exists("cache:shop:8").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_and_invalidate() {
        let (client, store) = client();
        client.set("cache:shop:1", &"old", Duration::from_secs(60)).await.unwrap();

        let rows = client
            .update_and_invalidate("cache:shop:1", async { Ok::<_, LoaderError>(1u64) })
            .await
            .unwrap();
        assert_eq!(rows, 1);
        assert!(!store.exists("cache:shop:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_update_keeps_cache() {
        let (client, store) = client();
        client.set("cache:shop:1", &"old", Duration::from_secs(60)).await.unwrap();

        let err = client
            .update_and_invalidate("cache:shop:1", async { Err::<(), LoaderError>("constraint violated".into()) })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::SourceWrite { .. }));
        assert!(store.exists("cache:shop:1").await.unwrap());
    }
}
