// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Key-value store backends.
//!
//! - [`traits::KvStore`]: the primitives the cache layer consumes
//! - [`memory::InMemoryStore`]: DashMap with per-entry deadlines (tests, single process)
//! - [`redis::RedisStore`]: Redis via a multiplexed `ConnectionManager`

pub mod traits;
pub mod memory;
pub mod redis;
