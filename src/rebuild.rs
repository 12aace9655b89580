// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fixed-size worker pool for asynchronous cache rebuilds.
//!
//! ```text
//!   submit() ──try_send──▶ [ bounded queue ] ──▶ worker 0..N ──▶ task
//!                │ full/closed
//!                ▼
//!         RebuildRejected
//! ```
//!
//! Submission never blocks the read path: when the queue is full the task
//! is rejected and the caller keeps serving stale data. Each task runs in
//! its own spawned child so a panicking task costs one rebuild, not a worker.
//!
//! The pool is created once by the host and handed to every
//! [`CacheClient`](crate::CacheClient) that should share it.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::CacheConfig;
use crate::error::CacheError;

pub type RebuildTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Shared {
    in_flight: AtomicUsize,
    completed: AtomicU64,
    panicked: AtomicU64,
    idle: Notify,
}

impl Shared {
    fn finish(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

pub struct RebuildScheduler {
    sender: Mutex<Option<mpsc::Sender<RebuildTask>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    capacity: usize,
    shared: Arc<Shared>,
}

impl RebuildScheduler {
    /// Start `workers` workers draining a queue of `capacity` pending tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel::<RebuildTask>(capacity);
        let rx = Arc::new(AsyncMutex::new(rx));
        let shared = Arc::new(Shared {
            in_flight: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
            idle: Notify::new(),
        });

        let handles = (0..workers)
            .map(|id| tokio::spawn(run_worker(id, rx.clone(), shared.clone())))
            .collect();

        info!("Rebuild scheduler started with {} workers (queue capacity {})", workers, capacity);

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
            capacity,
            shared,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.rebuild_workers, config.rebuild_queue_capacity)
    }

    /// Queue a task without waiting. Fails if the queue is full or the
    /// scheduler has been shut down.
    pub fn submit<F>(&self, task: F) -> Result<(), CacheError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.sender.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(CacheError::RebuildRejected("scheduler shut down".to_string()));
        };

        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        match tx.try_send(Box::pin(task)) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.shared.finish();
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => format!("queue full ({} pending)", self.capacity),
                    mpsc::error::TrySendError::Closed(_) => "queue closed".to_string(),
                };
                Err(CacheError::RebuildRejected(reason))
            }
        }
    }

    /// Tasks queued or running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Tasks finished (including ones that panicked or were rejected).
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn panicked(&self) -> u64 {
        self.shared.panicked.load(Ordering::SeqCst)
    }

    /// Wait until no task is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting tasks, let workers drain the queue, and wait for them.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let handles: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Rebuild worker ended abnormally: {}", e);
            }
        }
        info!("Rebuild scheduler stopped ({} tasks completed)", self.completed());
    }
}

impl Drop for RebuildScheduler {
    fn drop(&mut self) {
        // Closing the channel lets idle workers exit on their own
        self.sender.lock().take();
    }
}

async fn run_worker(id: usize, rx: Arc<AsyncMutex<mpsc::Receiver<RebuildTask>>>, shared: Arc<Shared>) {
    loop {
        let task = rx.lock().await.recv().await;
        let Some(task) = task else {
            debug!("Rebuild worker {} exiting", id);
            return;
        };

        if let Err(e) = tokio::spawn(task).await {
            shared.panicked.fetch_add(1, Ordering::SeqCst);
            error!("Rebuild task on worker {} panicked: {}", id, e);
        }
        shared.finish();
    }
}
