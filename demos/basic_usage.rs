// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic cache-aside usage example.
//!
//! Demonstrates, for a toy shop table:
//! 1. Pass-through reads, including an id that doesn't exist
//! 2. A stampede of concurrent mutex reads on a cold key
//! 3. Logical expiry: pre-warm, serve stale, rebuild in the background
//! 4. Update the source, then invalidate
//! 5. Displaying metrics
//! 6. Clean shutdown
//!
//! Uses the in-memory store unless `REDIS_URL` is set:
//! ```bash
//! cargo run --example basic_usage
//! REDIS_URL=redis://localhost:6379 cargo run --example basic_usage
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cache_aside::{CacheClient, CacheConfig, InMemoryStore, LoaderError, RebuildScheduler};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

const SHOP_PREFIX: &str = "cache:shop:";
const SHOP_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Shop {
    id: u64,
    name: String,
    score: u32,
}

/// Stand-in for the database: a table plus a query counter.
#[derive(Clone, Default)]
struct ShopTable {
    rows: Arc<RwLock<HashMap<u64, Shop>>>,
    queries: Arc<AtomicUsize>,
}

impl ShopTable {
    async fn select(&self, id: u64) -> Result<Option<Shop>, LoaderError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn update_score(&self, id: u64, score: u32) -> Result<bool, LoaderError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(shop) => {
                shop.score = score;
                Ok(true)
            }
            None => Err(format!("no shop {}", id).into()),
        }
    }

    fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[tokio::main]
async fn main() -> Result<(), LoaderError> {
    // Install metrics recorder
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║             cache-aside: Basic Usage Example                  ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    let table = ShopTable::default();
    {
        let mut rows = table.rows.write().await;
        rows.insert(1, Shop { id: 1, name: "Tea House".into(), score: 41 });
        rows.insert(2, Shop { id: 2, name: "Noodle Bar".into(), score: 45 });
        rows.insert(3, Shop { id: 3, name: "Hot Pot".into(), score: 48 });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 0. Build the client
    // ─────────────────────────────────────────────────────────────────────────
    let config = CacheConfig {
        redis_url: std::env::var("REDIS_URL").ok(),
        redis_prefix: Some("demo:".into()),
        lock_retry_backoff_ms: 10,
        ttl_jitter: 0.1,
        ..Default::default()
    };
    let scheduler = Arc::new(RebuildScheduler::from_config(&config));
    let cache = if config.redis_url.is_some() {
        println!("📦 Connecting to Redis...");
        CacheClient::connect(config, scheduler.clone()).await?
    } else {
        println!("📦 Using the in-memory store (set REDIS_URL for Redis)");
        CacheClient::new(Arc::new(InMemoryStore::new()), scheduler.clone(), config)
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Pass-through
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📖 Pass-through reads...");
    for id in [1u64, 1, 404, 404, 404] {
        let db = table.clone();
        let start = std::time::Instant::now();
        let shop = cache
            .query_pass_through(SHOP_PREFIX, id, |id| async move { db.select(id).await }, SHOP_TTL)
            .await?;
        println!("   └─ shop {} → {:?} ({:?})", id, shop.map(|s| s.name), start.elapsed());
    }
    println!("   ⚡ Database queries so far: {} (404 queried once)", table.queries());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Mutex under a stampede
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🐘 100 concurrent reads of cold shop 2...");
    let before = table.queries();
    let mut handles = Vec::new();
    for _ in 0..100 {
        let cache = cache.clone();
        let db = table.clone();
        handles.push(tokio::spawn(async move {
            cache
                .query_with_mutex(SHOP_PREFIX, 2u64, |id| async move { db.select(id).await }, SHOP_TTL)
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }
    println!("   ✅ Database queries for the stampede: {}", table.queries() - before);

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Logical expiry
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔥 Hot key with logical expiry (1s)...");
    let db = table.clone();
    cache
        .warm_logical(SHOP_PREFIX, 3u64, |id| async move { db.select(id).await }, Duration::from_secs(1))
        .await?;
    table.update_score(3, 50).await?;
    tokio::time::sleep(Duration::from_millis(1100)).await;

    for round in 1..=2 {
        let db = table.clone();
        let shop = cache
            .query_with_logical_expire(
                SHOP_PREFIX,
                3u64,
                |id| async move { db.select(id).await },
                Duration::from_secs(1),
            )
            .await?;
        println!("   └─ round {}: score {:?}", round, shop.map(|s| s.score));
        scheduler.wait_idle().await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Update then invalidate
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Updating shop 1 and invalidating its key...");
    cache
        .update_and_invalidate("cache:shop:1", table.update_score(1, 49))
        .await?;
    let db = table.clone();
    let shop = cache
        .query_pass_through(SHOP_PREFIX, 1u64, |id| async move { db.select(id).await }, SHOP_TTL)
        .await?;
    println!("   └─ shop 1 score now {:?}", shop.map(|s| s.score));

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Clean shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down rebuild workers...");
    scheduler.shutdown().await;

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Print counters and histogram summaries, sorted by name
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines = Vec::new();

    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        let rendered = match value {
            DebugValue::Counter(v) => format!("{} = {}", label_str, v),
            DebugValue::Gauge(v) => format!("{} = {:.2}", label_str, v.into_inner()),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                format!("{} count={} sum={:.4}s", label_str, count, sum)
            }
        };
        lines.push(format!("{}{}", key.name(), rendered));
    }

    lines.sort();
    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {}", line);
    }
}
