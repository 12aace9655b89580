// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::time::Duration;

use thiserror::Error;

use crate::codec::CodecError;
use crate::storage::traits::StorageError;

/// Error a loader may return. Loaders wrap database/driver errors in this.
pub type LoaderError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum CacheError {
    /// The store could not be reached or rejected the command.
    #[error("cache store unavailable: {0}")]
    StoreUnavailable(#[from] StorageError),

    /// A stored value could not be decoded. Read paths treat this as a miss.
    #[error("corrupt cache entry at '{key}': {reason}")]
    CorruptCacheEntry { key: String, reason: String },

    /// The loader failed while filling `key`.
    #[error("loader failed for '{key}': {source}")]
    Loader {
        key: String,
        #[source]
        source: LoaderError,
    },

    /// The source-of-truth write in `update_and_invalidate` failed; the
    /// cache was not touched.
    #[error("source write failed for '{key}': {source}")]
    SourceWrite {
        key: String,
        #[source]
        source: LoaderError,
    },

    /// A value could not be serialized for writing.
    #[error("failed to encode value for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: CodecError,
    },

    /// Waited longer than `lock_wait_timeout` for another caller's rebuild.
    #[error("timed out after {waited:?} waiting for rebuild lock on '{key}'")]
    Timeout { key: String, waited: Duration },

    /// The rebuild queue is full or the scheduler has shut down.
    #[error("rebuild rejected: {0}")]
    RebuildRejected(String),
}

impl CacheError {
    pub(crate) fn corrupt(key: &str, err: CodecError) -> Self {
        CacheError::CorruptCacheEntry {
            key: key.to_string(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn encode(key: &str, err: CodecError) -> Self {
        CacheError::Encode {
            key: key.to_string(),
            source: err,
        }
    }

    pub(crate) fn loader(key: &str, err: LoaderError) -> Self {
        CacheError::Loader {
            key: key.to_string(),
            source: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::from(StorageError::Connection("refused".to_string()));
        assert_eq!(err.to_string(), "cache store unavailable: Storage connection error: refused");

        let err = CacheError::Timeout {
            key: "cache:shop:1".to_string(),
            waited: Duration::from_millis(500),
        };
        assert!(err.to_string().contains("cache:shop:1"));
        assert!(err.to_string().contains("500ms"));

        let err = CacheError::corrupt("cache:shop:1", CodecError::Corrupt("eof".to_string()));
        assert_eq!(err.to_string(), "corrupt cache entry at 'cache:shop:1': corrupt cache entry: eof");
    }

    #[test]
    fn test_loader_error_keeps_source() {
        use std::error::Error as _;

        let err = CacheError::loader("cache:shop:7", "db down".into());
        assert_eq!(err.source().unwrap().to_string(), "db down");
    }
}
