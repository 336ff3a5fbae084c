// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Headless-browser renderer pool.
//
// Owns at most one Chromium process at a time. Every render gets a fresh
// page (page pooling was tried and abandoned upstream as unstable), and
// every stage of a render runs under its own timer: content set, PDF
// generation, and page close each have an independent budget so a wedged
// CDP call can never stall the pool.
//
// The pool self-heals: a heartbeat verifies the CDP connection stays
// alive, and a recycle tears the old process down (abandoning it if it
// refuses to die), waits a quiet gap, and relaunches.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParamsBuilder;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use labelpress_core::capability::Renderer;
use labelpress_core::error::{LabelpressError, Result};
use labelpress_core::types::PageGeometry;

use crate::geometry::PageInches;

/// Fixed launch arguments. Everything that could wake the browser up on
/// its own (GPU, extensions, background networking, autoplay) is off.
const CHROMIUM_ARGS: &[&str] = &[
    "--disable-gpu",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-sync",
    "--disable-default-apps",
    "--autoplay-policy=user-gesture-required",
    "--no-first-run",
    "--mute-audio",
    "--hide-scrollbars",
];

/// Renderer pool timing budgets.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Budget for launching the browser process.
    pub launch_timeout: Duration,
    /// Soft budget for network quiescence after content set.
    pub content_soft_timeout: Duration,
    /// Hard budget for the whole content-set phase.
    pub content_hard_timeout: Duration,
    /// Hard budget for PDF generation.
    pub pdf_timeout: Duration,
    /// Hard budget for closing a page.
    pub close_timeout: Duration,
    /// Period of the connectivity heartbeat.
    pub heartbeat_interval: Duration,
    /// How long a recycling browser gets to close before being abandoned.
    pub recycle_close_timeout: Duration,
    /// Quiet gap between teardown and relaunch.
    pub recycle_quiet_gap: Duration,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            launch_timeout: Duration::from_secs(30),
            content_soft_timeout: Duration::from_secs(20),
            content_hard_timeout: Duration::from_secs(25),
            pdf_timeout: Duration::from_secs(8),
            close_timeout: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(60),
            recycle_close_timeout: Duration::from_secs(10),
            recycle_quiet_gap: Duration::from_secs(3),
        }
    }
}

/// Pool statistics exposed through the metrics endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererStatus {
    pub available: bool,
    pub renders_ok: u64,
    pub renders_failed: u64,
    pub recycles: u64,
}

struct BrowserHandle {
    browser: Browser,
    /// Drives the CDP websocket; the connection stalls if this stops.
    handler_task: JoinHandle<()>,
}

/// Single-browser renderer pool.
pub struct RendererPool {
    /// Lifecycle mutations (launch, recycle) take the write half; renders
    /// share the read half so they may run concurrently on a live browser.
    slot: tokio::sync::RwLock<Option<BrowserHandle>>,
    ready: AtomicBool,
    renders_ok: AtomicU64,
    renders_failed: AtomicU64,
    recycles: AtomicU64,
    config: RendererConfig,
}

impl RendererPool {
    /// Create an empty pool. The browser launches lazily on the first
    /// recycle so a missing Chromium install cannot fail server startup.
    pub fn new(config: RendererConfig) -> Self {
        Self {
            slot: tokio::sync::RwLock::new(None),
            ready: AtomicBool::new(false),
            renders_ok: AtomicU64::new(0),
            renders_failed: AtomicU64::new(0),
            recycles: AtomicU64::new(0),
            config,
        }
    }

    /// Render an HTML document to PDF bytes.
    pub async fn render(&self, html: &str, geometry: &PageGeometry) -> Result<Vec<u8>> {
        let inches = PageInches::from_geometry(geometry)?;

        let slot = self.slot.read().await;
        let handle = slot.as_ref().ok_or_else(|| {
            LabelpressError::RendererUnavailable("browser not running".into())
        })?;
        if !self.ready.load(Ordering::SeqCst) {
            return Err(LabelpressError::RendererUnavailable(
                "browser marked unhealthy".into(),
            ));
        }

        let result = self.render_on(handle, html, inches).await;
        match &result {
            Ok(pdf) => {
                self.renders_ok.fetch_add(1, Ordering::Relaxed);
                debug!(bytes = pdf.len(), "render complete");
            }
            Err(e) => {
                self.renders_failed.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "render failed");
            }
        }
        result
    }

    /// Pool statistics snapshot.
    pub fn status(&self) -> RendererStatus {
        RendererStatus {
            available: self.ready.load(Ordering::SeqCst),
            renders_ok: self.renders_ok.load(Ordering::Relaxed),
            renders_failed: self.renders_failed.load(Ordering::Relaxed),
            recycles: self.recycles.load(Ordering::Relaxed),
        }
    }

    /// Whether the browser is up and believed healthy.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Tear down the current browser (if any) and launch a fresh one.
    pub async fn recycle(&self) -> Result<()> {
        let mut slot = self.slot.write().await;
        self.ready.store(false, Ordering::SeqCst);

        if let Some(mut handle) = slot.take() {
            info!("recycling headless browser");
            let closed = tokio::time::timeout(self.config.recycle_close_timeout, async {
                let _ = handle.browser.close().await;
                let _ = handle.browser.wait().await;
            })
            .await;
            if closed.is_err() {
                warn!("browser refused to close in time, abandoning process");
            }
            handle.handler_task.abort();
            self.recycles.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(self.config.recycle_quiet_gap).await;
        }

        let (browser, mut handler) =
            tokio::time::timeout(self.config.launch_timeout, Browser::launch(browser_config()?))
                .await
                .map_err(|_| {
                    LabelpressError::RendererUnavailable("browser launch timed out".into())
                })?
                .map_err(|e| {
                    LabelpressError::RendererUnavailable(format!("browser launch: {e}"))
                })?;

        // The handler stream must be polled for the CDP connection to make
        // progress. Individual deserialization errors are routine noise.
        let handler_task = tokio::spawn(async move {
            while handler.next().await.is_some() {}
        });

        *slot = Some(BrowserHandle {
            browser,
            handler_task,
        });
        self.ready.store(true, Ordering::SeqCst);
        info!("headless browser ready");
        Ok(())
    }

    /// Spawn the connectivity heartbeat. On a dead CDP connection the pool
    /// is marked not-ready; the next render triggers a recycle.
    pub fn spawn_heartbeat(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }

                let slot = self.slot.read().await;
                if let Some(handle) = slot.as_ref() {
                    let alive = tokio::time::timeout(
                        Duration::from_secs(5),
                        handle.browser.version(),
                    )
                    .await;
                    if !matches!(alive, Ok(Ok(_))) {
                        warn!("browser heartbeat failed, marking renderer not ready");
                        self.ready.store(false, Ordering::SeqCst);
                    }
                }
            }
        })
    }

    /// Close the browser for good at shutdown.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.write().await;
        self.ready.store(false, Ordering::SeqCst);
        if let Some(mut handle) = slot.take() {
            let _ = tokio::time::timeout(self.config.recycle_close_timeout, async {
                let _ = handle.browser.close().await;
                let _ = handle.browser.wait().await;
            })
            .await;
            handle.handler_task.abort();
        }
    }

    async fn render_on(
        &self,
        handle: &BrowserHandle,
        html: &str,
        inches: PageInches,
    ) -> Result<Vec<u8>> {
        let page = tokio::time::timeout(
            self.config.content_hard_timeout,
            handle.browser.new_page("about:blank"),
        )
        .await
        .map_err(|_| LabelpressError::RenderTimeout)?
        .map_err(|e| LabelpressError::RenderFailed(format!("new page: {e}")))?;

        let result = self.drive_page(&page, html, inches).await;

        // The page is closed on every exit path. A close that blows its
        // budget leaks the page reference and schedules a recycle instead
        // of hanging the render task.
        match tokio::time::timeout(self.config.close_timeout, page.close()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!(error = %e, "page close reported an error"),
            Err(_) => {
                warn!("page close timed out, scheduling browser recycle");
                self.ready.store(false, Ordering::SeqCst);
            }
        }

        result
    }

    async fn drive_page(&self, page: &Page, html: &str, inches: PageInches) -> Result<Vec<u8>> {
        // Content set: the soft budget lets remote images settle, the hard
        // budget bounds the whole phase even when navigation never quiesces.
        tokio::time::timeout(self.config.content_hard_timeout, async {
            page.set_content(html)
                .await
                .map_err(|e| LabelpressError::RenderFailed(format!("set content: {e}")))?;
            let _ = tokio::time::timeout(
                self.config.content_soft_timeout,
                page.wait_for_navigation(),
            )
            .await;
            Ok::<_, LabelpressError>(())
        })
        .await
        .map_err(|_| LabelpressError::RenderTimeout)??;

        let params = PrintToPdfParamsBuilder::default()
            .landscape(inches.landscape)
            .prefer_css_page_size(true)
            .print_background(true)
            .paper_width(inches.width)
            .paper_height(inches.height)
            .margin_top(inches.margin_top)
            .margin_right(inches.margin_right)
            .margin_bottom(inches.margin_bottom)
            .margin_left(inches.margin_left)
            .build();

        tokio::time::timeout(self.config.pdf_timeout, page.pdf(params))
            .await
            .map_err(|_| LabelpressError::RenderTimeout)?
            .map_err(|e| LabelpressError::RenderFailed(format!("print to pdf: {e}")))
    }
}

impl Renderer for RendererPool {
    async fn render(&self, html: String, geometry: PageGeometry) -> Result<Vec<u8>> {
        RendererPool::render(self, &html, &geometry).await
    }

    fn is_ready(&self) -> bool {
        RendererPool::is_ready(self)
    }

    async fn recycle(&self) -> Result<()> {
        RendererPool::recycle(self).await
    }
}

fn browser_config() -> Result<BrowserConfig> {
    BrowserConfig::builder()
        .no_sandbox()
        .viewport(None)
        .args(CHROMIUM_ARGS.iter().copied())
        .build()
        .map_err(|e| LabelpressError::RendererUnavailable(format!("browser config: {e}")))
}
