// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Bounded in-memory priority queue.
//
// Ordering is (priority rank desc, admission sequence asc): high preempts
// medium preempts low at dispatch time, FIFO within a class. Capacity
// counts queued plus in-flight jobs; admission past it fails with
// QueueFull. Terminal jobs are retained with hard caps and oldest-first
// eviction so a long-running process never grows without bound.
//
// A transient-failed job is rescheduled in place with a linear backoff
// (`retry_delay × retry_count`). It keeps its queue slot while backing
// off, so capacity accounting and the one-state-at-a-time invariant both
// hold throughout.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use labelpress_core::error::{ErrorClass, LabelpressError, Result};
use labelpress_core::types::{JobId, JobState, PrintJob, PrintLabel, PrintRequest, Priority};

use crate::events::{JobEvent, JobEvents};

/// Queue tuning.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Capacity across queued + in-flight jobs.
    pub max_size: usize,
    /// Retries granted to a transient-failed job.
    pub max_retries: u32,
    /// Base retry delay; attempt n waits `retry_delay × n`.
    pub retry_delay: Duration,
    /// Retained completed jobs.
    pub completed_retention: usize,
    /// Retained failed jobs.
    pub failed_retention: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            completed_retention: 1000,
            failed_retention: 500,
        }
    }
}

/// Result of one processing attempt, as reported by the dispatcher.
#[derive(Debug)]
pub enum JobOutcome {
    Success,
    Failure(LabelpressError),
}

/// Counts per lifecycle bucket.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub queued: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Sort key: lower `slot` (inverted rank) first, then admission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    slot: u8,
    seq: u64,
}

impl QueueKey {
    fn new(priority: Priority, seq: u64) -> Self {
        Self {
            slot: 3 - priority.rank(),
            seq,
        }
    }
}

struct QueuedEntry {
    job: PrintJob,
    /// A retrying job is invisible to `take` until this passes.
    not_before: Option<Instant>,
}

#[derive(Default)]
struct QueueInner {
    queued: BTreeMap<QueueKey, QueuedEntry>,
    in_flight: HashMap<JobId, PrintJob>,
    completed: HashMap<JobId, PrintJob>,
    completed_order: VecDeque<JobId>,
    failed: HashMap<JobId, PrintJob>,
    failed_order: VecDeque<JobId>,
    /// Monotone admission counter; ties within a priority break FIFO.
    seq: u64,
}

/// The scheduler's job store. All mutations serialize on one lock;
/// readers see a consistent snapshot.
pub struct PriorityQueue {
    inner: Mutex<QueueInner>,
    events: JobEvents,
    config: QueueConfig,
}

impl PriorityQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            events: JobEvents::default(),
            config,
        }
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Admit one label as a new job. Fails with `QueueFull` at capacity.
    pub fn admit(&self, label: PrintLabel, priority: Priority) -> Result<JobId> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");

        if inner.queued.len() + inner.in_flight.len() >= self.config.max_size {
            return Err(LabelpressError::QueueFull);
        }

        let request = PrintRequest::new(label, priority);
        let job = PrintJob::new(request);
        let id = job.id;

        inner.seq += 1;
        let key = QueueKey::new(priority, inner.seq);
        inner.queued.insert(
            key,
            QueuedEntry {
                job,
                not_before: None,
            },
        );

        debug!(job_id = %id, priority = ?priority, "job admitted");
        Ok(id)
    }

    /// Take up to `n` dispatchable jobs, highest-ranked first. Taken jobs
    /// are marked in-flight with their start time recorded; concurrent
    /// callers receive disjoint batches.
    pub fn take(&self, n: usize) -> Vec<PrintJob> {
        if n == 0 {
            return Vec::new();
        }

        let mut inner = self.inner.lock().expect("queue lock poisoned");
        let now = Instant::now();

        let keys: Vec<QueueKey> = inner
            .queued
            .iter()
            .filter(|(_, entry)| entry.not_before.is_none_or(|t| now >= t))
            .take(n)
            .map(|(key, _)| *key)
            .collect();

        let mut batch = Vec::with_capacity(keys.len());
        for key in keys {
            let mut entry = inner.queued.remove(&key).expect("key just observed");
            entry.job.state = JobState::Processing;
            entry.job.started_at = Some(Utc::now());
            inner.in_flight.insert(entry.job.id, entry.job.clone());
            batch.push(entry.job);
        }
        batch
    }

    /// Record the outcome of an in-flight job. Transient failures with
    /// retry budget left are rescheduled with linear backoff; everything
    /// else lands in a capped terminal map.
    pub fn complete(&self, id: JobId, outcome: JobOutcome) {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        let inner = &mut *inner;

        let Some(mut job) = inner.in_flight.remove(&id) else {
            warn!(job_id = %id, "completion for unknown in-flight job ignored");
            return;
        };

        match outcome {
            JobOutcome::Success => {
                job.state = JobState::Completed;
                job.finished_at = Some(Utc::now());
                let duration_ms = job.processing_ms().unwrap_or_default();
                let printer = job.request.label.printer_name.clone();
                info!(job_id = %id, duration_ms, "job completed");

                inner.completed_order.push_back(id);
                inner.completed.insert(id, job);
                Self::evict(
                    &mut inner.completed,
                    &mut inner.completed_order,
                    self.config.completed_retention,
                );

                self.events.emit(JobEvent::Completed {
                    id,
                    printer,
                    duration_ms,
                });
            }
            JobOutcome::Failure(error) => {
                job.last_error = Some(error.to_string());
                let retriable = error.class() == ErrorClass::Transient
                    && job.request.retry_count < self.config.max_retries;

                if retriable {
                    job.request.retry_count += 1;
                    let attempt = job.request.retry_count;
                    let delay = self.config.retry_delay * attempt;
                    job.state = JobState::Queued;
                    job.started_at = None;
                    info!(job_id = %id, attempt, delay_ms = delay.as_millis() as u64, "job scheduled for retry");

                    inner.seq += 1;
                    let key = QueueKey::new(job.request.priority, inner.seq);
                    inner.queued.insert(
                        key,
                        QueuedEntry {
                            job,
                            not_before: Some(Instant::now() + delay),
                        },
                    );

                    self.events.emit(JobEvent::Retry { id, attempt, delay });
                } else {
                    job.state = JobState::Failed;
                    job.finished_at = Some(Utc::now());
                    let printer = job.request.label.printer_name.clone();
                    let error_text = error.to_string();
                    warn!(job_id = %id, error = %error_text, "job failed");

                    inner.failed_order.push_back(id);
                    inner.failed.insert(id, job);
                    Self::evict(
                        &mut inner.failed,
                        &mut inner.failed_order,
                        self.config.failed_retention,
                    );

                    self.events.emit(JobEvent::Failed {
                        id,
                        printer,
                        error: error_text,
                    });
                }
            }
        }
    }

    /// Look a job up across every lifecycle bucket.
    pub fn get(&self, id: JobId) -> Option<PrintJob> {
        let inner = self.inner.lock().expect("queue lock poisoned");
        inner
            .in_flight
            .get(&id)
            .or_else(|| inner.completed.get(&id))
            .or_else(|| inner.failed.get(&id))
            .cloned()
            .or_else(|| {
                inner
                    .queued
                    .values()
                    .find(|entry| entry.job.id == id)
                    .map(|entry| entry.job.clone())
            })
    }

    /// Counts per lifecycle bucket.
    pub fn status(&self) -> QueueStatus {
        let inner = self.inner.lock().expect("queue lock poisoned");
        QueueStatus {
            queued: inner.queued.len(),
            in_flight: inner.in_flight.len(),
            completed: inner.completed.len(),
            failed: inner.failed.len(),
        }
    }

    /// Ids of jobs currently in flight. Used at shutdown to mark
    /// force-cancelled work.
    pub fn in_flight_ids(&self) -> Vec<JobId> {
        self.inner
            .lock()
            .expect("queue lock poisoned")
            .in_flight
            .keys()
            .copied()
            .collect()
    }

    fn evict(map: &mut HashMap<JobId, PrintJob>, order: &mut VecDeque<JobId>, cap: usize) {
        while order.len() > cap {
            if let Some(oldest) = order.pop_front() {
                map.remove(&oldest);
            }
        }
    }
}
