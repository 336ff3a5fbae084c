// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// End-to-end scheduler tests with in-memory renderer and spool fakes.
// Everything here runs without Chromium or a Windows spooler.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio_util::sync::CancellationToken;

use labelpress_core::capability::{Renderer, SpoolSink};
use labelpress_core::error::{LabelpressError, Result};
use labelpress_core::types::{
    JobId, JobState, Margins, PageGeometry, PrintJob, PrintLabel, PrintMedia, PrinterStatus,
    Priority,
};
use labelpress_print::breaker::{BreakerConfig, BreakerRegistry};
use labelpress_print::registry::PrinterRegistry;
use labelpress_queue::{Dispatcher, DispatcherConfig, PriorityQueue, QueueConfig};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Renderer fake: echoes the HTML back as the "PDF" so tests can observe
/// which job produced which spool.
struct FakeRenderer {
    ready: AtomicBool,
    recycles: AtomicU64,
    delay: Duration,
}

impl FakeRenderer {
    fn ready() -> Self {
        Self {
            ready: AtomicBool::new(true),
            recycles: AtomicU64::new(0),
            delay: Duration::ZERO,
        }
    }

    fn disconnected() -> Self {
        Self {
            ready: AtomicBool::new(false),
            recycles: AtomicU64::new(0),
            delay: Duration::ZERO,
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            ready: AtomicBool::new(true),
            recycles: AtomicU64::new(0),
            delay,
        }
    }
}

impl Renderer for FakeRenderer {
    async fn render(&self, html: String, _geometry: PageGeometry) -> Result<Vec<u8>> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(LabelpressError::RendererUnavailable("browser down".into()));
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(html.into_bytes())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn recycle(&self) -> Result<()> {
        self.recycles.fetch_add(1, Ordering::SeqCst);
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Spool fake with scripted failures.
#[derive(Default)]
struct FakeSpool {
    spooled: Mutex<Vec<String>>,
    attempts: AtomicU64,
    fail_always: AtomicBool,
    fail_remaining: AtomicI64,
}

impl FakeSpool {
    fn failing_first(n: i64) -> Self {
        let spool = Self::default();
        spool.fail_remaining.store(n, Ordering::SeqCst);
        spool
    }

    fn always_failing() -> Self {
        let spool = Self::default();
        spool.fail_always.store(true, Ordering::SeqCst);
        spool
    }

    fn spooled(&self) -> Vec<String> {
        self.spooled.lock().unwrap().clone()
    }
}

impl SpoolSink for FakeSpool {
    async fn spool(&self, pdf: Vec<u8>, _printer_name: String) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_always.load(Ordering::SeqCst)
            || self.fail_remaining.fetch_sub(1, Ordering::SeqCst) > 0
        {
            return Err(LabelpressError::SpoolFailed("forced failure".into()));
        }
        self.spooled
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(&pdf).into_owned());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    queue: Arc<PriorityQueue>,
    registry: Arc<PrinterRegistry>,
    renderer: Arc<FakeRenderer>,
    spooler: Arc<FakeSpool>,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

fn fast_dispatcher() -> DispatcherConfig {
    DispatcherConfig {
        max_concurrent_jobs: 5,
        batch_size: 5,
        processing_timeout: Duration::from_secs(5),
        shutdown_grace: Duration::from_millis(100),
        tick: Duration::from_millis(10),
    }
}

fn start(
    queue_config: QueueConfig,
    dispatcher_config: DispatcherConfig,
    breaker_config: BreakerConfig,
    renderer: FakeRenderer,
    spooler: FakeSpool,
) -> Harness {
    let breakers = Arc::new(BreakerRegistry::new(breaker_config));
    let registry = Arc::new(PrinterRegistry::new(Arc::clone(&breakers)));
    registry.set_status("P", PrinterStatus::Online);

    let queue = Arc::new(PriorityQueue::new(queue_config));
    let renderer = Arc::new(renderer);
    let spooler = Arc::new(spooler);

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&queue),
        Arc::clone(&registry),
        breakers,
        Arc::clone(&renderer),
        Arc::clone(&spooler),
        dispatcher_config,
    ));
    let cancel = CancellationToken::new();
    let handle = dispatcher.spawn(cancel.clone());

    Harness {
        queue,
        registry,
        renderer,
        spooler,
        cancel,
        handle,
    }
}

fn label(printer: &str, marker: &str, copies: u8) -> PrintLabel {
    PrintLabel {
        printer_name: printer.into(),
        html: BASE64.encode(format!("<p>{marker}</p>")),
        media: PrintMedia::Label,
        margin: Margins::zero(),
        group: None,
        width: "2in".into(),
        height: "1in".into(),
        orientation: None,
        copies,
        user_id: None,
        name: None,
    }
}

async fn wait_terminal(queue: &PriorityQueue, id: JobId) -> PrintJob {
    for _ in 0..500 {
        if let Some(job) = queue.get(id) {
            if matches!(job.state, JobState::Completed | JobState::Failed) {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached a terminal state");
}

async fn wait_state(queue: &PriorityQueue, id: JobId, state: JobState) {
    for _ in 0..500 {
        if queue.get(id).is_some_and(|j| j.state == state) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached {state:?}");
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn happy_path_one_label_two_copies() {
    let h = start(
        QueueConfig::default(),
        fast_dispatcher(),
        BreakerConfig::default(),
        FakeRenderer::ready(),
        FakeSpool::default(),
    );

    let id = h.queue.admit(label("P", "wristband-1", 2), Priority::Medium).unwrap();
    let job = wait_terminal(&h.queue, id).await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(h.spooler.spooled().len(), 2);
    assert!(h.spooler.spooled().iter().all(|pdf| pdf.contains("wristband-1")));
    // Per-printer in-flight count returned to its prior value.
    assert_eq!(h.registry.get("P").unwrap().in_flight, 0);

    h.cancel.cancel();
    h.handle.await.unwrap();
}

#[tokio::test]
async fn mixed_priorities_dispatch_high_medium_low() {
    let config = DispatcherConfig {
        max_concurrent_jobs: 1,
        batch_size: 1,
        ..fast_dispatcher()
    };
    // Jobs admitted before the dispatcher catches up; a small render delay
    // keeps the single slot busy long enough to observe ordering.
    let h = start(
        QueueConfig::default(),
        config,
        BreakerConfig::default(),
        FakeRenderer::slow(Duration::from_millis(20)),
        FakeSpool::default(),
    );

    let low = h.queue.admit(label("P", "job-low", 1), Priority::Low).unwrap();
    let high = h.queue.admit(label("P", "job-high", 1), Priority::High).unwrap();
    let med = h.queue.admit(label("P", "job-med", 1), Priority::Medium).unwrap();

    for id in [low, high, med] {
        let job = wait_terminal(&h.queue, id).await;
        assert_eq!(job.state, JobState::Completed);
    }

    let order = h.spooler.spooled();
    assert!(order[0].contains("job-high"), "got {order:?}");
    assert!(order[1].contains("job-med"), "got {order:?}");
    assert!(order[2].contains("job-low"), "got {order:?}");

    h.cancel.cancel();
    h.handle.await.unwrap();
}

#[tokio::test]
async fn in_flight_never_exceeds_cap() {
    let config = DispatcherConfig {
        max_concurrent_jobs: 2,
        batch_size: 5,
        ..fast_dispatcher()
    };
    let h = start(
        QueueConfig::default(),
        config,
        BreakerConfig::default(),
        FakeRenderer::slow(Duration::from_millis(30)),
        FakeSpool::default(),
    );

    let ids: Vec<JobId> = (0..6)
        .map(|i| h.queue.admit(label("P", &format!("j{i}"), 1), Priority::Medium).unwrap())
        .collect();

    for _ in 0..100 {
        assert!(h.queue.status().in_flight <= 2);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for id in ids {
        let job = wait_terminal(&h.queue, id).await;
        assert_eq!(job.state, JobState::Completed);
    }

    h.cancel.cancel();
    h.handle.await.unwrap();
}

#[tokio::test]
async fn unknown_printer_fails_without_consuming_retries() {
    let h = start(
        QueueConfig::default(),
        fast_dispatcher(),
        BreakerConfig::default(),
        FakeRenderer::ready(),
        FakeSpool::default(),
    );

    let id = h.queue.admit(label("P_MISSING", "ghost", 1), Priority::Medium).unwrap();
    let job = wait_terminal(&h.queue, id).await;

    assert_eq!(job.state, JobState::Failed);
    assert!(job.last_error.as_deref().unwrap().contains("not found"));
    assert_eq!(job.request.retry_count, 0);
    assert_eq!(h.spooler.attempts.load(Ordering::SeqCst), 0);

    h.cancel.cancel();
    h.handle.await.unwrap();
}

#[tokio::test]
async fn offline_printer_fails_jobs_without_retry() {
    let h = start(
        QueueConfig::default(),
        fast_dispatcher(),
        BreakerConfig::default(),
        FakeRenderer::ready(),
        FakeSpool::default(),
    );

    let first = h.queue.admit(label("P", "before", 1), Priority::Medium).unwrap();
    assert_eq!(wait_terminal(&h.queue, first).await.state, JobState::Completed);

    h.registry.set_status("P", PrinterStatus::Offline);
    let ids: Vec<JobId> = (0..3)
        .map(|i| h.queue.admit(label("P", &format!("after-{i}"), 1), Priority::Medium).unwrap())
        .collect();

    for id in ids {
        let job = wait_terminal(&h.queue, id).await;
        assert_eq!(job.state, JobState::Failed);
        assert!(job.last_error.as_deref().unwrap().contains("Offline"));
        assert_eq!(job.request.retry_count, 0);
    }

    h.cancel.cancel();
    h.handle.await.unwrap();
}

#[tokio::test]
async fn disconnected_renderer_recycles_once_and_completes() {
    let h = start(
        QueueConfig::default(),
        fast_dispatcher(),
        BreakerConfig::default(),
        FakeRenderer::disconnected(),
        FakeSpool::default(),
    );

    let id = h.queue.admit(label("P", "revived", 1), Priority::Medium).unwrap();
    let job = wait_terminal(&h.queue, id).await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(h.renderer.recycles.load(Ordering::SeqCst), 1);

    h.cancel.cancel();
    h.handle.await.unwrap();
}

#[tokio::test]
async fn single_copy_failure_is_fatal_and_retried_as_transient() {
    let h = start(
        QueueConfig {
            max_retries: 1,
            retry_delay: Duration::from_millis(10),
            ..Default::default()
        },
        fast_dispatcher(),
        BreakerConfig::default(),
        FakeRenderer::ready(),
        FakeSpool::always_failing(),
    );

    let id = h.queue.admit(label("P", "doomed", 1), Priority::Medium).unwrap();
    let job = wait_terminal(&h.queue, id).await;

    assert_eq!(job.state, JobState::Failed);
    // Original attempt plus one transient retry.
    assert_eq!(job.request.retry_count, 1);
    assert_eq!(h.spooler.attempts.load(Ordering::SeqCst), 2);

    h.cancel.cancel();
    h.handle.await.unwrap();
}

#[tokio::test]
async fn majority_of_copies_suffices() {
    // One of two copies fails; 1 ≥ ⌈2/2⌉ so the job still completes.
    let h = start(
        QueueConfig::default(),
        fast_dispatcher(),
        BreakerConfig::default(),
        FakeRenderer::ready(),
        FakeSpool::failing_first(1),
    );

    let id = h.queue.admit(label("P", "pair", 2), Priority::Medium).unwrap();
    let job = wait_terminal(&h.queue, id).await;
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(h.spooler.spooled().len(), 1);

    h.cancel.cancel();
    h.handle.await.unwrap();
}

#[tokio::test]
async fn minority_of_copies_fails_with_indices() {
    // Six of ten copies fail; 4 < 5 so the job fails and names the copies.
    let h = start(
        QueueConfig {
            max_retries: 0,
            ..Default::default()
        },
        fast_dispatcher(),
        BreakerConfig::default(),
        FakeRenderer::ready(),
        FakeSpool::failing_first(6),
    );

    let id = h.queue.admit(label("P", "bulk", 10), Priority::Medium).unwrap();
    let job = wait_terminal(&h.queue, id).await;

    assert_eq!(job.state, JobState::Failed);
    let error = job.last_error.unwrap();
    assert!(error.contains("6 of 10 copies failed"), "got: {error}");

    h.cancel.cancel();
    h.handle.await.unwrap();
}

#[tokio::test]
async fn breaker_trips_and_blocks_admission_to_printer() {
    let h = start(
        QueueConfig {
            max_retries: 0,
            ..Default::default()
        },
        fast_dispatcher(),
        BreakerConfig {
            failure_threshold: 3,
            monitoring_window: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(60),
            success_threshold: 3,
        },
        FakeRenderer::ready(),
        FakeSpool::always_failing(),
    );

    // Three spool failures from one three-copy job trip the breaker.
    let first = h.queue.admit(label("P", "trip", 3), Priority::Medium).unwrap();
    assert_eq!(wait_terminal(&h.queue, first).await.state, JobState::Failed);
    assert_eq!(h.spooler.attempts.load(Ordering::SeqCst), 3);

    // The next job is refused before the spooler is ever invoked.
    let second = h.queue.admit(label("P", "blocked", 1), Priority::Medium).unwrap();
    let job = wait_terminal(&h.queue, second).await;
    assert_eq!(job.state, JobState::Failed);
    assert!(job.last_error.as_deref().unwrap().contains("circuit breaker open"));
    assert_eq!(h.spooler.attempts.load(Ordering::SeqCst), 3);

    h.cancel.cancel();
    h.handle.await.unwrap();
}

#[tokio::test]
async fn processing_deadline_fails_stuck_job() {
    let config = DispatcherConfig {
        processing_timeout: Duration::from_millis(50),
        ..fast_dispatcher()
    };
    let h = start(
        QueueConfig {
            max_retries: 0,
            ..Default::default()
        },
        config,
        BreakerConfig::default(),
        FakeRenderer::slow(Duration::from_secs(30)),
        FakeSpool::default(),
    );

    let id = h.queue.admit(label("P", "stuck", 1), Priority::Medium).unwrap();
    let job = wait_terminal(&h.queue, id).await;

    assert_eq!(job.state, JobState::Failed);
    assert!(job.last_error.as_deref().unwrap().contains("deadline"));
    // The drop guard released the printer slot despite the cancellation.
    assert_eq!(h.registry.get("P").unwrap().in_flight, 0);

    h.cancel.cancel();
    h.handle.await.unwrap();
}

#[tokio::test]
async fn shutdown_cancels_in_flight_jobs_after_grace() {
    let h = start(
        QueueConfig::default(),
        fast_dispatcher(),
        BreakerConfig::default(),
        FakeRenderer::slow(Duration::from_secs(30)),
        FakeSpool::default(),
    );

    let id = h.queue.admit(label("P", "interrupted", 1), Priority::Medium).unwrap();
    wait_state(&h.queue, id, JobState::Processing).await;

    h.cancel.cancel();
    h.handle.await.unwrap();

    let job = h.queue.get(id).expect("job retained");
    assert_eq!(job.state, JobState::Failed);
    assert!(job.last_error.as_deref().unwrap().contains("cancelled"));
    assert_eq!(h.registry.get("P").unwrap().in_flight, 0);
}

#[tokio::test]
async fn duplicate_submission_yields_distinct_job_ids() {
    let h = start(
        QueueConfig::default(),
        fast_dispatcher(),
        BreakerConfig::default(),
        FakeRenderer::ready(),
        FakeSpool::default(),
    );

    let body = label("P", "same-body", 1);
    let a = h.queue.admit(body.clone(), Priority::Medium).unwrap();
    let b = h.queue.admit(body, Priority::Medium).unwrap();
    assert_ne!(a, b);

    for id in [a, b] {
        assert_eq!(wait_terminal(&h.queue, id).await.state, JobState::Completed);
    }
    assert_eq!(h.spooler.spooled().len(), 2);

    h.cancel.cancel();
    h.handle.await.unwrap();
}
