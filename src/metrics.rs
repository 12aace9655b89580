// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the cache layer.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `cache_aside_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `strategy`: pass_through, mutex, logical_expire
//! - `outcome`: hit, absent, miss, stale, corrupt
//! - `status`: ok, absent, error, rejected

use std::time::Duration;

use metrics::{counter, histogram};

pub const PASS_THROUGH: &str = "pass_through";
pub const MUTEX: &str = "mutex";
pub const LOGICAL_EXPIRE: &str = "logical_expire";

/// Record the outcome of the initial store lookup
pub fn record_lookup(strategy: &'static str, outcome: &'static str) {
    counter!(
        "cache_aside_lookups_total",
        "strategy" => strategy,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a call into the source of truth
pub fn record_loader_call(strategy: &'static str, duration: Duration) {
    counter!("cache_aside_loader_calls_total", "strategy" => strategy).increment(1);
    histogram!("cache_aside_loader_seconds", "strategy" => strategy).record(duration.as_secs_f64());
}

/// Record a failed lock acquisition
pub fn record_lock_contention(strategy: &'static str) {
    counter!("cache_aside_lock_contention_total", "strategy" => strategy).increment(1);
}

/// Record a mutex wait that ran past its deadline
pub fn record_lock_timeout() {
    counter!("cache_aside_lock_timeouts_total").increment(1);
}

/// Record the end of an asynchronous rebuild
pub fn record_rebuild(status: &'static str) {
    counter!("cache_aside_rebuilds_total", "status" => status).increment(1);
}

/// Record a store failure surfaced to the caller
pub fn record_store_error(operation: &'static str) {
    counter!("cache_aside_store_errors_total", "operation" => operation).increment(1);
}
