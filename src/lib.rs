//! # Cache Aside
//!
//! A cache-aside layer over a shared key-value store, with protection
//! against the three classic cache failure modes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CacheClient                          │
//! │  • query_pass_through / query_with_mutex /                  │
//! │    query_with_logical_expire                                │
//! │  • set / set_with_logical_expire / invalidate               │
//! └─────────────────────────────────────────────────────────────┘
//!          │                    │                     │
//!          ▼                    ▼                     ▼
//! ┌────────────────┐  ┌───────────────────┐  ┌─────────────────────┐
//! │  Entry Codec   │  │    MutexLock      │  │  RebuildScheduler   │
//! │  JSON payload, │  │  SET NX PX lease  │  │  fixed worker pool, │
//! │  "" marker,    │  │  lock:<key>       │  │  bounded queue      │
//! │  expireAt env. │  │                   │  │                     │
//! └────────────────┘  └───────────────────┘  └─────────────────────┘
//!          │                    │
//!          ▼                    ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 KvStore (Redis / in-memory)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure modes
//!
//! - **Penetration** (lookups for ids that don't exist): the first miss
//!   caches an absent marker for a short TTL, so repeats never reach the
//!   source.
//! - **Breakdown** (a hot key expires under load): the mutex strategy lets
//!   one caller rebuild while the rest poll; the logical-expiry strategy
//!   serves stale data and rebuilds in the background.
//! - **Avalanche** (many keys expire together): optional TTL jitter on
//!   read-through fills.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use cache_aside::{CacheClient, CacheConfig, RebuildScheduler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cache_aside::CacheError> {
//!     let config = CacheConfig {
//!         redis_url: Some("redis://localhost:6379".into()),
//!         ..Default::default()
//!     };
//!     let scheduler = Arc::new(RebuildScheduler::from_config(&config));
//!     let cache = CacheClient::connect(config, scheduler.clone()).await?;
//!
//!     let shop: Option<String> = cache
//!         .query_with_mutex("cache:shop:", 42, |id| async move {
//!             // SELECT ... FROM shop WHERE id = ?
//!             Ok(Some(format!("shop {}", id)))
//!         }, Duration::from_secs(1800))
//!         .await?;
//!     println!("{:?}", shop);
//!
//!     scheduler.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See [`CacheConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`client`]: The [`CacheClient`] facade and its read strategies
//! - [`codec`]: Payload, absent marker and logical-expiry envelope encoding
//! - [`lock`]: Self-expiring per-key mutex
//! - [`rebuild`]: Worker pool for background rebuilds
//! - [`storage`]: Store backends (Redis, in-memory)
//! - [`resilience`]: Retry policy for connecting

pub mod config;
pub mod codec;
pub mod error;
pub mod storage;
pub mod resilience;
pub mod lock;
pub mod rebuild;
pub mod client;
pub mod metrics;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use config::CacheConfig;
pub use client::{store_key, CacheClient};
pub use codec::{CacheEntry, Cached, CodecError, ABSENT_MARKER};
pub use error::{CacheError, LoaderError};
pub use lock::{LockGuard, MutexLock};
pub use rebuild::RebuildScheduler;
pub use storage::traits::{KvStore, StorageError};
pub use storage::memory::InMemoryStore;
pub use storage::redis::RedisStore;
pub use resilience::retry::RetryConfig;
