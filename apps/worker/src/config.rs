// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Worker configuration loaded from environment variables.

use std::time::Duration;

use diagram_compiler::{CompileOptions, RetryPolicy, WorkerOptions};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Maximum pooled connections.
    pub database_max_connections: u32,
    /// How long a transaction waits for a row lock before failing.
    pub lock_timeout_ms: u64,
    /// Number of concurrent workers.
    pub worker_count: usize,
    /// Queue items claimed per batch.
    pub batch_size: usize,
    /// Sleep between polls of an empty queue.
    pub poll_interval_ms: u64,
    /// How long a claimed batch stays hidden from other workers.
    pub claim_lease_secs: u64,
    /// Attempts before a batch is dead-lettered.
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Number of location index buckets.
    pub location_bucket_count: u32,
    /// `json` for machine-readable logs, anything else for pretty output.
    pub log_format: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/diagram".into()),
            database_max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".into())
                .parse()
                .unwrap_or(10),
            lock_timeout_ms: std::env::var("LOCK_TIMEOUT_MS")
                .unwrap_or_else(|_| "30000".into())
                .parse()
                .unwrap_or(30_000),
            worker_count: std::env::var("WORKER_COUNT")
                .unwrap_or_else(|_| num_cpus::get().to_string())
                .parse()
                .unwrap_or_else(|_| num_cpus::get()),
            batch_size: std::env::var("BATCH_SIZE")
                .unwrap_or_else(|_| "500".into())
                .parse()
                .unwrap_or(500),
            poll_interval_ms: std::env::var("POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "1000".into())
                .parse()
                .unwrap_or(1000),
            claim_lease_secs: std::env::var("CLAIM_LEASE_SECS")
                .unwrap_or_else(|_| "300".into())
                .parse()
                .unwrap_or(300),
            max_attempts: std::env::var("MAX_ATTEMPTS")
                .unwrap_or_else(|_| "5".into())
                .parse()
                .unwrap_or(5),
            retry_base_delay_ms: std::env::var("RETRY_BASE_DELAY_MS")
                .unwrap_or_else(|_| "2000".into())
                .parse()
                .unwrap_or(2000),
            retry_max_delay_ms: std::env::var("RETRY_MAX_DELAY_MS")
                .unwrap_or_else(|_| "60000".into())
                .parse()
                .unwrap_or(60_000),
            location_bucket_count: std::env::var("LOCATION_BUCKET_COUNT")
                .unwrap_or_else(|_| "8192".into())
                .parse()
                .unwrap_or(8192),
            log_format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".into()),
        }
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            // Buckets are stored in an INT column.
            location_bucket_count: self.location_bucket_count.clamp(1, i32::MAX as u32),
        }
    }

    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            workers: self.worker_count.max(1),
            batch_size: self.batch_size.max(1),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            claim_lease: Duration::from_secs(self.claim_lease_secs),
            retry: RetryPolicy {
                max_attempts: self.max_attempts.max(1),
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
                max_delay: Duration::from_millis(self.retry_max_delay_ms),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_count_fits_the_index_column() {
        let mut config = Config::from_env();
        config.location_bucket_count = u32::MAX;
        assert_eq!(config.compile_options().location_bucket_count, i32::MAX as u32);

        config.location_bucket_count = 0;
        assert_eq!(config.compile_options().location_bucket_count, 1);
    }
}
