// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Worker pool.
//!
//! Each worker loops `claim -> compile -> commit`, releasing failed batches
//! with backoff and dead-lettering them once the retry budget is spent.
//! Shutdown is observed only between batches; a batch in flight always runs
//! to commit or rollback.

use std::sync::Arc;
use std::time::Duration;

use diagram_core::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::pipeline::Compiler;
use crate::report::CompileReport;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::store::WorkQueue;

/// Worker pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    pub workers: usize,
    /// Queue items claimed per batch.
    pub batch_size: usize,
    /// Sleep between polls of an empty queue.
    pub poll_interval: Duration,
    /// How long claimed items stay hidden from other workers.
    pub claim_lease: Duration,
    pub retry: RetryPolicy,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            batch_size: 500,
            poll_interval: Duration::from_millis(1000),
            claim_lease: Duration::from_secs(300),
            retry: RetryPolicy::default(),
        }
    }
}

/// What one pass of a worker did.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// The queue had nothing visible.
    Idle,
    Committed(CompileReport),
    Retried { items: usize, delay: Duration },
    DeadLettered { items: usize },
}

/// Claims and compiles one batch.
///
/// Compile failures are handled here and reported through the outcome; an
/// `Err` means the queue itself could not be reached.
pub async fn run_once(
    compiler: &Compiler,
    queue: &dyn WorkQueue,
    options: &WorkerOptions,
) -> Result<BatchOutcome> {
    let items = queue.claim(options.batch_size, options.claim_lease).await?;
    if items.is_empty() {
        return Ok(BatchOutcome::Idle);
    }

    let err = match compiler.compile_batch(&items).await {
        Ok(report) => return Ok(BatchOutcome::Committed(report)),
        Err(err) => err,
    };
    let reason = err.to_string();

    match options.retry.decide_for(&items) {
        RetryDecision::Retry { delay } => {
            if err.is_invariant_violation() {
                error!(items = items.len(), delay_ms = delay.as_millis() as u64, error = %err, "Batch failed, retrying");
            } else {
                warn!(items = items.len(), delay_ms = delay.as_millis() as u64, error = %err, "Batch failed, retrying");
            }
            queue.release(&items, delay, &reason).await?;
            Ok(BatchOutcome::Retried {
                items: items.len(),
                delay,
            })
        }
        RetryDecision::DeadLetter => {
            error!(items = items.len(), error = %err, "Batch dead-lettered after retries");
            queue.dead_letter(&items, &reason).await?;
            Ok(BatchOutcome::DeadLettered { items: items.len() })
        }
    }
}

/// A set of workers sharing one compiler and queue.
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `options.workers` workers on the current runtime.
    pub fn spawn(compiler: Arc<Compiler>, queue: Arc<dyn WorkQueue>, options: WorkerOptions) -> Self {
        let (shutdown, rx) = watch::channel(false);

        let handles = (0..options.workers.max(1))
            .map(|worker| {
                let compiler = compiler.clone();
                let queue = queue.clone();
                let rx = rx.clone();
                tokio::spawn(async move {
                    worker_loop(worker, compiler, queue, options, rx).await;
                })
            })
            .collect();

        info!(workers = options.workers.max(1), batch_size = options.batch_size, "Started worker pool");
        Self { shutdown, handles }
    }

    /// Stops every worker after its current batch and waits for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(error = %err, "Worker task panicked");
            }
        }
        info!("Worker pool stopped");
    }
}

async fn worker_loop(
    worker: usize,
    compiler: Arc<Compiler>,
    queue: Arc<dyn WorkQueue>,
    options: WorkerOptions,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker, "Worker started");

    while !*shutdown.borrow() {
        let idle = match run_once(&compiler, queue.as_ref(), &options).await {
            Ok(BatchOutcome::Idle) => true,
            Ok(_) => false,
            Err(err) => {
                error!(worker, error = %err, "Work queue unavailable");
                true
            }
        };

        if idle {
            tokio::select! {
                _ = tokio::time::sleep(options.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }

    debug!(worker, "Worker stopped");
}
