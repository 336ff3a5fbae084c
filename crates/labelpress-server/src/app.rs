// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// CLI and environment binding. Every option has a flag and an environment
// variable; flags win when both are present.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use labelpress_core::config::Config;

#[derive(Debug, Parser)]
#[command(name = "labelpress", about = "Local HTTP print-job server for HTML labels")]
pub struct App {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Tokio worker threads; defaults to one per core.
    #[arg(long, env = "WORKERS")]
    pub workers: Option<usize>,

    #[arg(long, env = "MAX_QUEUE_SIZE", default_value_t = 100)]
    pub max_queue_size: usize,

    #[arg(long, env = "MAX_CONCURRENT_JOBS", default_value_t = 5)]
    pub max_concurrent_jobs: usize,

    #[arg(long, env = "BATCH_SIZE", default_value_t = 5)]
    pub batch_size: usize,

    #[arg(long, env = "MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Base retry delay in milliseconds.
    #[arg(long, env = "RETRY_DELAY", default_value_t = 2000)]
    pub retry_delay_ms: u64,

    /// Per-job hard deadline in milliseconds.
    #[arg(long, env = "PROCESSING_TIMEOUT", default_value_t = 30_000)]
    pub processing_timeout_ms: u64,

    /// Health ticker period in milliseconds (floor-clamped to 60 s).
    #[arg(long, env = "PRINTER_HEALTH_CHECK_INTERVAL", default_value_t = 60_000)]
    pub health_check_interval_ms: u64,

    #[arg(long, env = "RATE_LIMIT_WINDOW_MS", default_value_t = 900_000)]
    pub rate_limit_window_ms: u64,

    #[arg(long, env = "RATE_LIMIT_MAX", default_value_t = 1000)]
    pub rate_limit_max: u32,

    /// Comma-separated CORS allow-list; `*` allows any origin.
    #[arg(long, env = "ALLOWED_ORIGINS", default_value = "*", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    #[arg(long, env = "SPOOLER_PATH", default_value = "PDFtoPrinter.exe")]
    pub spooler_path: PathBuf,

    #[arg(long, env = "SPOOL_DIR", default_value = "spool")]
    pub spool_dir: PathBuf,
}

impl App {
    pub fn into_config(self) -> Config {
        Config {
            host: self.host,
            port: self.port,
            workers: self.workers,
            max_queue_size: self.max_queue_size,
            max_concurrent_jobs: self.max_concurrent_jobs,
            batch_size: self.batch_size,
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            processing_timeout: Duration::from_millis(self.processing_timeout_ms),
            health_check_interval: Duration::from_millis(self.health_check_interval_ms),
            rate_limit_window: Duration::from_millis(self.rate_limit_window_ms),
            rate_limit_max: self.rate_limit_max,
            allowed_origins: self.allowed_origins,
            spooler_path: self.spooler_path,
            spool_dir: self.spool_dir,
        }
    }
}
