// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Diagram worker - drains the display object compile queue.
//!
//! Each worker claims a batch of queued object ids, compiles them and commits
//! the grid index, location index, compiled payloads and downstream signals
//! in one PostgreSQL transaction. Failed batches are retried with backoff and
//! dead-lettered once their attempts run out.
//!
//! Configuration comes from the environment; see [`config::Config`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use diagram_compiler::{Compiler, WorkerPool};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod config;
mod postgres;

use config::Config;
use postgres::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,diagram_compiler=debug,diagram_worker=debug"));
    if config.log_format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).pretty().init();
    }

    tracing::info!(
        workers = config.worker_count,
        batch_size = config.batch_size,
        poll_interval_ms = config.poll_interval_ms,
        max_attempts = config.max_attempts,
        location_buckets = config.location_bucket_count,
        "Starting diagram worker"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let store = Arc::new(PgStore::new(pool, Duration::from_millis(config.lock_timeout_ms)));
    let compiler = Arc::new(Compiler::new(
        store.clone(),
        store.clone(),
        config.compile_options(),
    ));

    let workers = WorkerPool::spawn(compiler, store, config.worker_options());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested, finishing in-flight batches");

    workers.shutdown().await;
    Ok(())
}
