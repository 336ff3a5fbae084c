// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Runtime configuration.
//
// Every knob has a sensible default so the server runs with an empty
// environment. The server binary binds these to environment variables and
// CLI flags; this struct stays independent of how the values arrive.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lower bound on the printer health-check period. Probing the Windows
/// spooler service more often than this destabilises it.
pub const MIN_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP bind address.
    pub host: String,
    /// HTTP bind port.
    pub port: u16,
    /// Tokio worker threads; `None` means one per core.
    pub workers: Option<usize>,
    /// Priority-queue capacity (queued + in-flight).
    pub max_queue_size: usize,
    /// Global in-flight job cap.
    pub max_concurrent_jobs: usize,
    /// Max jobs pulled per dispatcher tick.
    pub batch_size: usize,
    /// Retries granted to a transient-failed job.
    pub max_retries: u32,
    /// Base retry delay; actual delay is `retry_delay × retry_count`.
    pub retry_delay: Duration,
    /// Hard per-job processing deadline.
    pub processing_timeout: Duration,
    /// Printer health ticker period (clamped to at least 60 s).
    pub health_check_interval: Duration,
    /// Admission throttle window.
    pub rate_limit_window: Duration,
    /// Admitted requests per throttle window.
    pub rate_limit_max: u32,
    /// CORS allow-list; `*` allows any origin.
    pub allowed_origins: Vec<String>,
    /// Path to the external PDF-to-printer binary.
    pub spooler_path: PathBuf,
    /// Working directory for spool temp files, created on demand.
    pub spool_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            workers: None,
            max_queue_size: 100,
            max_concurrent_jobs: 5,
            batch_size: 5,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            processing_timeout: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(60),
            rate_limit_window: Duration::from_secs(15 * 60),
            rate_limit_max: 1000,
            allowed_origins: vec!["*".into()],
            spooler_path: PathBuf::from("PDFtoPrinter.exe"),
            spool_dir: PathBuf::from("spool"),
        }
    }
}

impl Config {
    /// Health-check period with the lower bound applied.
    pub fn effective_health_interval(&self) -> Duration {
        self.health_check_interval.max(MIN_HEALTH_CHECK_INTERVAL)
    }
}
