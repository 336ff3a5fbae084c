// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// In-memory printer registry.
//
// Holds the cached state of every OS printer the server has seen. Reads
// never touch the OS: callers get the last snapshot and accept up to one
// health-period of staleness in exchange for never blocking a request
// thread on a wedged spooler enumeration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use labelpress_core::error::{LabelpressError, Result};
use labelpress_core::types::{PrinterRecord, PrinterStatus};

use crate::breaker::BreakerRegistry;

/// A printer with more consecutive failures than this is held out of
/// service while its last error is still fresh.
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// How long a failure streak keeps a printer out of service.
const RECENT_FAILURE_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Registry of known printers, keyed by name.
///
/// Records are created at discovery, revived on re-discovery, and never
/// destroyed while the process lives.
pub struct PrinterRegistry {
    printers: Mutex<HashMap<String, PrinterRecord>>,
    breakers: Arc<BreakerRegistry>,
}

impl PrinterRegistry {
    pub fn new(breakers: Arc<BreakerRegistry>) -> Self {
        Self {
            printers: Mutex::new(HashMap::new()),
            breakers,
        }
    }

    /// Merge freshly discovered records into the registry. Existing records
    /// keep their error counters and in-flight counts; only identity and
    /// status fields are refreshed.
    pub fn merge_discovered(&self, discovered: Vec<PrinterRecord>) {
        let mut map = self.printers.lock().expect("printer map lock poisoned");
        let now = Utc::now();

        for incoming in discovered {
            match map.get_mut(&incoming.name) {
                Some(existing) => {
                    existing.status = incoming.status;
                    existing.port = incoming.port;
                    existing.driver = incoming.driver;
                    existing.cached_at = now;
                }
                None => {
                    info!(printer = %incoming.name, status = ?incoming.status, "printer discovered");
                    map.insert(incoming.name.clone(), incoming);
                }
            }
        }
    }

    /// Snapshot of all records. No I/O; may be up to one health-period stale.
    pub fn list(&self) -> Vec<PrinterRecord> {
        self.printers
            .lock()
            .expect("printer map lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<PrinterRecord> {
        self.printers
            .lock()
            .expect("printer map lock poisoned")
            .get(name)
            .cloned()
    }

    /// Number of printers currently reporting online.
    pub fn online_count(&self) -> usize {
        self.printers
            .lock()
            .expect("printer map lock poisoned")
            .values()
            .filter(|r| r.status == PrinterStatus::Online)
            .count()
    }

    /// Availability check used at admission and dispatch. Returns the
    /// specific refusal so callers can surface it per label.
    pub fn availability(&self, name: &str) -> Result<()> {
        {
            let map = self.printers.lock().expect("printer map lock poisoned");
            let record = map
                .get(name)
                .ok_or_else(|| LabelpressError::UnavailablePrinter(format!("printer {name} not found")))?;

            if record.status != PrinterStatus::Online {
                return Err(LabelpressError::UnavailablePrinter(format!(
                    "printer {name} is {:?}",
                    record.status
                )));
            }

            if record.consecutive_failures > MAX_CONSECUTIVE_FAILURES {
                let recent = record.last_error_at.is_some_and(|t| {
                    (Utc::now() - t).to_std().unwrap_or_default() < RECENT_FAILURE_WINDOW
                });
                if recent {
                    return Err(LabelpressError::UnavailablePrinter(format!(
                        "printer {name} held out after {} consecutive failures",
                        record.consecutive_failures
                    )));
                }
            }
        }

        // Breaker check last; it performs the open → half-open transition.
        self.breakers.check(name)
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.availability(name).is_ok()
    }

    /// Note a job starting against this printer.
    pub fn mark_job_start(&self, name: &str) {
        let mut map = self.printers.lock().expect("printer map lock poisoned");
        if let Some(record) = map.get_mut(name) {
            record.in_flight += 1;
        }
    }

    /// Note a job finishing against this printer. Success stamps the last
    /// completion time and clears the failure streak.
    pub fn mark_job_end(&self, name: &str, success: bool) {
        let mut map = self.printers.lock().expect("printer map lock poisoned");
        if let Some(record) = map.get_mut(name) {
            record.in_flight = record.in_flight.saturating_sub(1);
            if success {
                record.last_success = Some(Utc::now());
                record.consecutive_failures = 0;
            }
        }
    }

    /// Apply a successful health probe.
    pub fn record_probe_success(&self, name: &str, status: PrinterStatus) {
        let mut map = self.printers.lock().expect("printer map lock poisoned");
        let Some(record) = map.get_mut(name) else {
            return;
        };

        if record.status != status {
            info!(printer = name, from = ?record.status, to = ?status, "printer status changed");
        }
        record.status = status;
        record.checked_at = Some(Utc::now());
        record.cached_at = Utc::now();
        if status == PrinterStatus::Online {
            record.consecutive_failures = 0;
        }
    }

    /// Apply a failed health probe: bump the failure streak and downgrade
    /// the cached status.
    pub fn record_probe_failure(&self, name: &str) {
        let mut map = self.printers.lock().expect("printer map lock poisoned");
        let Some(record) = map.get_mut(name) else {
            return;
        };

        record.consecutive_failures += 1;
        record.last_error_at = Some(Utc::now());
        record.checked_at = Some(Utc::now());
        if record.status != PrinterStatus::Error {
            warn!(
                printer = name,
                failures = record.consecutive_failures,
                "probe failed, downgrading printer status"
            );
            record.status = PrinterStatus::Error;
        }
    }

    /// Force a printer's status. Used by operator tooling and tests.
    pub fn set_status(&self, name: &str, status: PrinterStatus) {
        let mut map = self.printers.lock().expect("printer map lock poisoned");
        match map.get_mut(name) {
            Some(record) => {
                record.status = status;
                record.cached_at = Utc::now();
            }
            None => {
                map.insert(name.to_owned(), PrinterRecord::new(name.to_owned(), status));
            }
        }
        debug!(printer = name, status = ?status, "printer status set");
    }

    /// Up to `n` printer names, least-recently-probed first. Drives the
    /// health loop's round-robin.
    pub fn stalest_checked(&self, n: usize) -> Vec<String> {
        let map = self.printers.lock().expect("printer map lock poisoned");
        let mut records: Vec<_> = map.values().collect();
        records.sort_by_key(|r| r.checked_at);
        records.into_iter().take(n).map(|r| r.name.clone()).collect()
    }
}
