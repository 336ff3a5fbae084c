// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Metrics aggregation.
//
// Counters come straight off the job event stream; gauges are sampled on
// a fixed ticker. Reads return the last-computed snapshot so a metrics
// scrape costs one lock and no recomputation. The processing-time mean is
// a Welford running update over completed jobs only, which stays stable
// over millions of samples.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use labelpress_print::registry::PrinterRegistry;

use crate::events::JobEvent;
use crate::queue::PriorityQueue;

/// Gauge refresh period.
const REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Point-in-time metrics view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub retries: u64,
    pub queue_length: usize,
    pub in_flight: usize,
    pub active_printers: usize,
    pub avg_processing_ms: f64,
    pub refreshed_at: DateTime<Utc>,
}

struct MetricsInner {
    total_jobs: u64,
    completed_jobs: u64,
    failed_jobs: u64,
    retries: u64,
    // Welford accumulator over completed processing times.
    count: u64,
    mean: f64,
    m2: f64,
    snapshot: MetricsSnapshot,
}

/// Windowed counters and timing accumulators for operator visibility.
pub struct MetricsAggregator {
    inner: Mutex<MetricsInner>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsInner {
                total_jobs: 0,
                completed_jobs: 0,
                failed_jobs: 0,
                retries: 0,
                count: 0,
                mean: 0.0,
                m2: 0.0,
                snapshot: MetricsSnapshot {
                    total_jobs: 0,
                    completed_jobs: 0,
                    failed_jobs: 0,
                    retries: 0,
                    queue_length: 0,
                    in_flight: 0,
                    active_printers: 0,
                    avg_processing_ms: 0.0,
                    refreshed_at: Utc::now(),
                },
            }),
        }
    }

    /// Count freshly admitted jobs.
    pub fn record_admitted(&self, n: u64) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        inner.total_jobs += n;
    }

    /// Fold one job event into the counters.
    pub fn observe(&self, event: &JobEvent) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        match event {
            JobEvent::Completed { duration_ms, .. } => {
                inner.completed_jobs += 1;
                // Welford running mean/variance update.
                let x = *duration_ms as f64;
                inner.count += 1;
                let delta = x - inner.mean;
                inner.mean += delta / inner.count as f64;
                inner.m2 += delta * (x - inner.mean);
            }
            JobEvent::Failed { .. } => {
                inner.failed_jobs += 1;
            }
            JobEvent::Retry { .. } => {
                inner.retries += 1;
            }
        }
    }

    /// Recompute the published snapshot from current counters and gauges.
    pub fn refresh(&self, queue: &PriorityQueue, registry: &PrinterRegistry) {
        let status = queue.status();
        let active_printers = registry.online_count();

        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        inner.snapshot = MetricsSnapshot {
            total_jobs: inner.total_jobs,
            completed_jobs: inner.completed_jobs,
            failed_jobs: inner.failed_jobs,
            retries: inner.retries,
            queue_length: status.queued,
            in_flight: status.in_flight,
            active_printers,
            avg_processing_ms: inner.mean,
            refreshed_at: Utc::now(),
        };
    }

    /// Last-computed snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner
            .lock()
            .expect("metrics lock poisoned")
            .snapshot
            .clone()
    }

    /// Spawn the aggregation task: drains job events as they happen and
    /// refreshes gauges every few seconds.
    pub fn spawn(
        self: Arc<Self>,
        queue: Arc<PriorityQueue>,
        registry: Arc<PrinterRegistry>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let mut rx = queue.subscribe();
        tokio::spawn(async move {
            info!("metrics aggregator started");
            let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("metrics aggregator shutting down");
                        return;
                    }
                    event = rx.recv() => {
                        match event {
                            Ok(event) => self.observe(&event),
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                                debug!(skipped, "metrics fell behind the event stream");
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                        }
                    }
                    _ = ticker.tick() => {
                        self.refresh(&queue, &registry);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelpress_core::types::JobId;

    fn completed(duration_ms: u64) -> JobEvent {
        JobEvent::Completed {
            id: JobId::new(),
            printer: "P".into(),
            duration_ms,
        }
    }

    #[test]
    fn counters_follow_events() {
        let metrics = MetricsAggregator::new();
        metrics.record_admitted(3);
        metrics.observe(&completed(100));
        metrics.observe(&JobEvent::Failed {
            id: JobId::new(),
            printer: "P".into(),
            error: "boom".into(),
        });
        metrics.observe(&JobEvent::Retry {
            id: JobId::new(),
            attempt: 1,
            delay: Duration::from_secs(2),
        });

        let inner = metrics.inner.lock().unwrap();
        assert_eq!(inner.total_jobs, 3);
        assert_eq!(inner.completed_jobs, 1);
        assert_eq!(inner.failed_jobs, 1);
        assert_eq!(inner.retries, 1);
    }

    #[test]
    fn welford_mean_matches_arithmetic_mean() {
        let metrics = MetricsAggregator::new();
        for d in [100, 200, 300, 400] {
            metrics.observe(&completed(d));
        }
        let inner = metrics.inner.lock().unwrap();
        assert!((inner.mean - 250.0).abs() < 1e-9);
        assert_eq!(inner.count, 4);
    }

    #[test]
    fn failures_do_not_move_the_mean() {
        let metrics = MetricsAggregator::new();
        metrics.observe(&completed(100));
        metrics.observe(&JobEvent::Failed {
            id: JobId::new(),
            printer: "P".into(),
            error: "boom".into(),
        });
        let inner = metrics.inner.lock().unwrap();
        assert!((inner.mean - 100.0).abs() < 1e-9);
        assert_eq!(inner.count, 1);
    }

    #[test]
    fn snapshot_returns_last_refresh() {
        use labelpress_print::breaker::BreakerRegistry;
        use crate::queue::QueueConfig;

        let metrics = MetricsAggregator::new();
        let queue = PriorityQueue::new(QueueConfig::default());
        let registry = PrinterRegistry::new(Arc::new(BreakerRegistry::default()));

        metrics.observe(&completed(80));
        // Counters are folded in, but the snapshot lags until a refresh.
        assert_eq!(metrics.snapshot().completed_jobs, 0);

        metrics.refresh(&queue, &registry);
        let snap = metrics.snapshot();
        assert_eq!(snap.completed_jobs, 1);
        assert!((snap.avg_processing_ms - 80.0).abs() < 1e-9);
    }
}
