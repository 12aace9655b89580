// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entry codec: typed values to and from the store's string representation.
//!
//! Two layouts share a key space but never a key family:
//!
//! ```text
//! physical expiry:  {"id":42,"name":"X"}                          (store TTL governs)
//! logical expiry:   {"data":{"id":42,"name":"X"},"expireAt":1767084657058}
//! absent marker:    ""                                            (short store TTL)
//! ```
//!
//! JSON never encodes to an empty string, so the absent marker cannot
//! collide with a payload.
//!
//! # Example
//!
//! ```
//! use cache_aside::codec::{self, Cached};
//! use std::time::Duration;
//!
//! let raw = codec::encode(&vec![1, 2, 3]).unwrap();
//! assert_eq!(codec::decode::<Vec<i32>>(&raw).unwrap(), Cached::Value(vec![1, 2, 3]));
//! assert_eq!(codec::decode::<Vec<i32>>(codec::ABSENT_MARKER).unwrap(), Cached::Absent);
//!
//! let raw = codec::encode_with_logical_expiry(&"hot", Duration::from_secs(60)).unwrap();
//! let entry = codec::decode_envelope::<String>(&raw).unwrap();
//! assert_eq!(entry.data, "hot");
//! assert!(!entry.is_expired());
//! ```

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stored in place of a payload when the source of truth confirmed the
/// record does not exist.
pub const ABSENT_MARKER: &str = "";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to serialize cache value: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("corrupt cache entry: {0}")]
    Corrupt(String),
}

/// A decoded physical-expiry value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cached<T> {
    Value(T),
    /// The absent marker: known missing from the source, do not reload.
    Absent,
}

impl<T> Cached<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Cached::Value(v) => Some(v),
            Cached::Absent => None,
        }
    }
}

/// Logical-expiration envelope.
///
/// The store keeps this entry without a physical TTL; `expire_at` (epoch
/// millis) is the freshness boundary checked on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub data: T,
    pub expire_at: i64,
}

impl<T> CacheEntry<T> {
    /// Wrap `data` with an expiry of `now + ttl`.
    pub fn new(data: T, ttl: Duration) -> Self {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Self {
            data,
            expire_at: now_millis().saturating_add(ttl_ms),
        }
    }

    pub fn with_expire_at(data: T, expire_at: i64) -> Self {
        Self { data, expire_at }
    }

    #[must_use]
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expire_at
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }
}

/// Wall-clock epoch millis. Logical expiry is compared across processes, so
/// this is `SystemTime`, not a monotonic clock.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(CodecError::Serialize)
}

pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<Cached<T>, CodecError> {
    if raw == ABSENT_MARKER {
        return Ok(Cached::Absent);
    }
    serde_json::from_str(raw)
        .map(Cached::Value)
        .map_err(|e| CodecError::Corrupt(e.to_string()))
}

pub fn encode_with_logical_expiry<T: Serialize + ?Sized>(value: &T, ttl: Duration) -> Result<String, CodecError> {
    encode_envelope(&CacheEntry::new(value, ttl))
}

pub fn encode_envelope<T: Serialize>(entry: &CacheEntry<T>) -> Result<String, CodecError> {
    encode(entry)
}

/// Decode a logical-expiration envelope. The absent marker is not a valid
/// envelope and is reported as corrupt; callers check for it first.
pub fn decode_envelope<T: DeserializeOwned>(raw: &str) -> Result<CacheEntry<T>, CodecError> {
    if raw == ABSENT_MARKER {
        return Err(CodecError::Corrupt("absent marker is not an envelope".to_string()));
    }
    serde_json::from_str(raw).map_err(|e| CodecError::Corrupt(e.to_string()))
}
