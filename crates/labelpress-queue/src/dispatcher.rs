// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Job dispatcher.
//
// Pulls jobs from the priority queue under a global concurrency cap and
// runs each in its own task with settle-all semantics: a panicking or
// failing job never touches its siblings. Every task carries a hard
// processing deadline, and the per-printer in-flight count is released by
// a drop guard so not even a deadline cancellation can leak it.
//
// Shutdown is two-phase: stop launching, then give in-flight tasks a
// grace period before force-cancelling them and recording `Cancelled`.

use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::future::join_all;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use labelpress_core::capability::{Renderer, SpoolSink};
use labelpress_core::error::{LabelpressError, Result};
use labelpress_core::pagecss::inject_page_css;
use labelpress_core::types::{PageGeometry, PrintJob};
use labelpress_print::breaker::BreakerRegistry;
use labelpress_print::registry::PrinterRegistry;

use crate::queue::{JobOutcome, PriorityQueue};

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Global in-flight job cap.
    pub max_concurrent_jobs: usize,
    /// Max jobs pulled per tick.
    pub batch_size: usize,
    /// Hard per-job deadline.
    pub processing_timeout: Duration,
    /// How long in-flight tasks get to settle at shutdown.
    pub shutdown_grace: Duration,
    /// Tick period.
    pub tick: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 5,
            batch_size: 5,
            processing_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(10),
            tick: Duration::from_secs(1),
        }
    }
}

/// Moves jobs from queued to terminal for the life of the process.
pub struct Dispatcher<R: Renderer, S: SpoolSink> {
    queue: Arc<PriorityQueue>,
    registry: Arc<PrinterRegistry>,
    breakers: Arc<BreakerRegistry>,
    renderer: Arc<R>,
    spooler: Arc<S>,
    config: DispatcherConfig,
}

impl<R: Renderer, S: SpoolSink> Dispatcher<R, S> {
    pub fn new(
        queue: Arc<PriorityQueue>,
        registry: Arc<PrinterRegistry>,
        breakers: Arc<BreakerRegistry>,
        renderer: Arc<R>,
        spooler: Arc<S>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            queue,
            registry,
            breakers,
            renderer,
            spooler,
            config,
        }
    }

    /// Spawn the dispatch loop. It runs until the token is cancelled, then
    /// drains in-flight work within the shutdown grace.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                cap = self.config.max_concurrent_jobs,
                batch = self.config.batch_size,
                "dispatcher started"
            );

            let mut ticker = tokio::time::interval(self.config.tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut tasks: JoinSet<()> = JoinSet::new();

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                // Reap settled tasks; their outcomes were already recorded.
                while tasks.try_join_next().is_some() {}

                let in_flight = self.queue.status().in_flight;
                let available = self.config.max_concurrent_jobs.saturating_sub(in_flight);
                if available == 0 {
                    continue;
                }

                for job in self.queue.take(available.min(self.config.batch_size)) {
                    let this = Arc::clone(&self);
                    tasks.spawn(async move { this.execute(job).await });
                }
            }

            self.drain(tasks).await;
        })
    }

    /// Settle in-flight tasks at shutdown, force-cancelling stragglers.
    async fn drain(&self, mut tasks: JoinSet<()>) {
        if tasks.is_empty() {
            info!("dispatcher stopped with no in-flight jobs");
            return;
        }

        info!(
            in_flight = tasks.len(),
            grace_secs = self.config.shutdown_grace.as_secs(),
            "dispatcher draining in-flight jobs"
        );

        let settled = tokio::time::timeout(self.config.shutdown_grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if settled.is_err() {
            warn!("shutdown grace expired, force-cancelling in-flight jobs");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            for id in self.queue.in_flight_ids() {
                self.queue
                    .complete(id, JobOutcome::Failure(LabelpressError::Cancelled));
            }
        }

        info!("dispatcher stopped");
    }

    /// Run one job to a terminal state. Never propagates an error; the
    /// outcome is recorded in the queue either way.
    async fn execute(&self, job: PrintJob) {
        let id = job.id;
        let outcome =
            match tokio::time::timeout(self.config.processing_timeout, self.process(&job)).await {
                Ok(Ok(())) => JobOutcome::Success,
                Ok(Err(e)) => JobOutcome::Failure(e),
                Err(_) => {
                    warn!(job_id = %id, "job exceeded processing deadline");
                    JobOutcome::Failure(LabelpressError::ProcessingTimeout)
                }
            };
        self.queue.complete(id, outcome);
    }

    async fn process(&self, job: &PrintJob) -> Result<()> {
        let label = &job.request.label;
        let printer = label.printer_name.as_str();

        // Availability combines cached status, the failure-streak guard,
        // and the breaker. None of these refusals are retried.
        self.registry.availability(printer)?;

        let guard = InFlightGuard::start(&self.registry, printer);

        let html_bytes = BASE64.decode(&label.html).map_err(|e| {
            LabelpressError::RenderFailed(format!("html is not valid base64: {e}"))
        })?;
        let html = String::from_utf8_lossy(&html_bytes).into_owned();
        let geometry = label.geometry();
        let html = inject_page_css(&html, &geometry);

        // One recycle attempt when the pool reports itself unhealthy; a
        // pool that cannot come back fails the job.
        if !self.renderer.is_ready() {
            info!(job_id = %job.id, "renderer not ready, recycling before render");
            self.renderer.recycle().await?;
        }

        let copies = usize::from(label.copies.max(1));
        let results = join_all(
            (0..copies).map(|_| self.run_copy(&html, &geometry, printer)),
        )
        .await;

        let failed_copies: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_err())
            .map(|(i, _)| i + 1)
            .collect();
        let succeeded = copies - failed_copies.len();

        if failed_copies.is_empty() {
            guard.succeed();
            return Ok(());
        }

        let first_error = results
            .into_iter()
            .find_map(|r| r.err())
            .expect("at least one copy failed");

        if copies == 1 {
            return Err(first_error);
        }

        // Majority rule: enough copies made it out, call the job done.
        if succeeded >= copies.div_ceil(2) {
            warn!(
                job_id = %job.id,
                succeeded,
                copies,
                failed = ?failed_copies,
                "partial copy failure within tolerance"
            );
            guard.succeed();
            return Ok(());
        }

        Err(copy_failure(&failed_copies, copies, first_error))
    }

    /// Render and spool one copy. Breaker accounting happens here, per
    /// printer interaction.
    async fn run_copy(&self, html: &str, geometry: &PageGeometry, printer: &str) -> Result<()> {
        let pdf = self
            .renderer
            .render(html.to_owned(), geometry.clone())
            .await?;
        debug!(printer, bytes = pdf.len(), "copy rendered");

        match self.spooler.spool(pdf, printer.to_owned()).await {
            Ok(()) => {
                self.breakers.record_success(printer);
                Ok(())
            }
            Err(e) => {
                self.breakers.record_failure(printer);
                Err(e)
            }
        }
    }
}

/// Aggregate a majority copy failure, keeping the first error's variant so
/// retry classification is preserved.
fn copy_failure(
    failed: &[usize],
    copies: usize,
    first: LabelpressError,
) -> LabelpressError {
    let detail = format!(
        "{} of {copies} copies failed (indices {failed:?}); first error: {first}",
        failed.len()
    );
    match first {
        LabelpressError::SpoolFailed(_) => LabelpressError::SpoolFailed(detail),
        LabelpressError::RenderTimeout | LabelpressError::RenderFailed(_) => {
            LabelpressError::RenderFailed(detail)
        }
        LabelpressError::RendererUnavailable(_) => LabelpressError::RendererUnavailable(detail),
        other => other,
    }
}

/// Releases the per-printer in-flight slot on drop, so cancellation at any
/// await point still decrements.
struct InFlightGuard<'a> {
    registry: &'a PrinterRegistry,
    printer: &'a str,
    success: Cell<bool>,
}

impl<'a> InFlightGuard<'a> {
    fn start(registry: &'a PrinterRegistry, printer: &'a str) -> Self {
        registry.mark_job_start(printer);
        Self {
            registry,
            printer,
            success: Cell::new(false),
        }
    }

    fn succeed(&self) {
        self.success.set(true);
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.mark_job_end(self.printer, self.success.get());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_failure_keeps_retry_class() {
        let err = copy_failure(
            &[1, 3],
            3,
            LabelpressError::SpoolFailed("exit 1".into()),
        );
        assert!(matches!(err, LabelpressError::SpoolFailed(_)));
        assert!(err.to_string().contains("[1, 3]"));

        let err = copy_failure(&[2], 2, LabelpressError::RenderTimeout);
        assert!(matches!(err, LabelpressError::RenderFailed(_)));
    }

    #[test]
    fn majority_threshold_is_ceil_half() {
        // copies = 10 → at least 5 successes pass.
        assert_eq!(10_usize.div_ceil(2), 5);
        // copies = 3 → at least 2 successes pass.
        assert_eq!(3_usize.div_ceil(2), 2);
        // copies = 1 → the single copy must succeed.
        assert_eq!(1_usize.div_ceil(2), 1);
    }
}
