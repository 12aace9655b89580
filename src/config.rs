// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the cache client.
//!
//! # Example
//!
//! ```
//! use cache_aside::CacheConfig;
//! use std::time::Duration;
//!
//! // Minimal config (uses defaults)
//! let config = CacheConfig::default();
//! assert_eq!(config.lock_ttl(), Duration::from_secs(10));
//! assert_eq!(config.null_ttl(), Duration::from_secs(120));
//!
//! // Full config
//! let config = CacheConfig {
//!     redis_url: Some("redis://localhost:6379".into()),
//!     rebuild_workers: 4,
//!     lock_retry_backoff_ms: 20,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Redis connection string (e.g., "redis://localhost:6379")
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Namespace prepended to every Redis key by the store
    #[serde(default)]
    pub redis_prefix: Option<String>,

    /// TTL of the absent marker. Kept well below payload TTLs so a record
    /// created in the source shows up soon after.
    #[serde(default = "default_null_ttl_secs")]
    pub null_ttl_secs: u64,

    /// Lock keys are `lock_prefix + cache key`
    #[serde(default = "default_lock_prefix")]
    pub lock_prefix: String,

    /// Lease on a rebuild lock. Bounds how long a crashed holder blocks others.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// Sleep between lock attempts in the mutex strategy
    #[serde(default = "default_lock_retry_backoff_ms")]
    pub lock_retry_backoff_ms: u64,

    /// Give up waiting for a contended lock after this long. The default
    /// outlasts one full lease plus a few retries, so a waiter behind a
    /// crashed holder still gets its turn.
    #[serde(default = "default_lock_wait_timeout_ms")]
    pub lock_wait_timeout_ms: u64,

    /// Fixed number of rebuild workers
    #[serde(default = "default_rebuild_workers")]
    pub rebuild_workers: usize,

    /// Pending rebuilds beyond this are rejected
    #[serde(default = "default_rebuild_queue_capacity")]
    pub rebuild_queue_capacity: usize,

    /// Random +/- fraction applied to physical payload TTLs (0.0 = off).
    /// Spreads out expiry of keys cached at the same moment.
    #[serde(default)]
    pub ttl_jitter: f64,
}

fn default_null_ttl_secs() -> u64 { 120 }
fn default_lock_prefix() -> String { "lock:".to_string() }
fn default_lock_ttl_secs() -> u64 { 10 }
fn default_lock_retry_backoff_ms() -> u64 { 50 }
fn default_lock_wait_timeout_ms() -> u64 { 10_250 }
fn default_rebuild_workers() -> usize { 10 }
fn default_rebuild_queue_capacity() -> usize { 1024 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            redis_prefix: None,
            null_ttl_secs: default_null_ttl_secs(),
            lock_prefix: default_lock_prefix(),
            lock_ttl_secs: default_lock_ttl_secs(),
            lock_retry_backoff_ms: default_lock_retry_backoff_ms(),
            lock_wait_timeout_ms: default_lock_wait_timeout_ms(),
            rebuild_workers: default_rebuild_workers(),
            rebuild_queue_capacity: default_rebuild_queue_capacity(),
            ttl_jitter: 0.0,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.lock_ttl_secs == 0 {
            return Err("lock_ttl_secs must be greater than 0".to_string());
        }
        if self.null_ttl_secs == 0 {
            return Err("null_ttl_secs must be greater than 0".to_string());
        }
        if self.rebuild_workers == 0 {
            return Err("rebuild_workers must be greater than 0".to_string());
        }
        if self.rebuild_queue_capacity == 0 {
            return Err("rebuild_queue_capacity must be greater than 0".to_string());
        }
        if !(0.0..1.0).contains(&self.ttl_jitter) {
            return Err("ttl_jitter must be in [0.0, 1.0)".to_string());
        }
        Ok(())
    }

    #[must_use]
    pub fn null_ttl(&self) -> Duration {
        Duration::from_secs(self.null_ttl_secs)
    }

    #[must_use]
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    #[must_use]
    pub fn lock_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.lock_retry_backoff_ms)
    }

    #[must_use]
    pub fn lock_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_wait_timeout_ms)
    }

    /// Apply `ttl_jitter` to a payload TTL. Never returns less than 1s
    /// unless the input itself was shorter.
    #[must_use]
    pub fn jittered(&self, ttl: Duration) -> Duration {
        if !self.ttl_jitter.is_finite() || self.ttl_jitter <= 0.0 {
            return ttl;
        }
        let base = ttl.as_secs_f64();
        let spread = base * self.ttl_jitter;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        // Near Duration::MAX the sum can exceed what a Duration holds.
        Duration::try_from_secs_f64((base + offset).max(base.min(1.0))).unwrap_or(ttl)
    }
}
