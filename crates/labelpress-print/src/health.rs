// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Background printer health loop.
//
// A single ticker probes a few printers per tick, least-recently-checked
// first, so a large fleet is covered over several periods without ever
// saturating the spooler service. Ticks never overlap: if a previous tick
// is somehow still probing, the next one is skipped outright.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery;
use crate::registry::PrinterRegistry;

/// Printers probed per tick.
const PROBES_PER_TICK: usize = 3;

/// Pause between consecutive probes within one tick.
const INTER_PROBE_GAP: Duration = Duration::from_millis(100);

/// Periodic health prober for the printer registry.
pub struct HealthMonitor {
    registry: Arc<PrinterRegistry>,
    interval: Duration,
    ticking: AtomicBool,
}

impl HealthMonitor {
    pub fn new(registry: Arc<PrinterRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            interval,
            ticking: AtomicBool::new(false),
        }
    }

    /// Spawn the health loop. It runs until the token is cancelled.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(period_secs = self.interval.as_secs(), "printer health loop started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so startup discovery
            // results are not instantly re-probed.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("printer health loop shutting down");
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                if self.ticking.swap(true, Ordering::SeqCst) {
                    warn!("previous health tick still running, skipping this one");
                    continue;
                }
                self.run_tick().await;
                self.ticking.store(false, Ordering::SeqCst);
            }
        })
    }

    /// Probe up to `PROBES_PER_TICK` printers, stalest first.
    async fn run_tick(&self) {
        let targets = self.registry.stalest_checked(PROBES_PER_TICK);
        if targets.is_empty() {
            debug!("no printers to probe");
            return;
        }

        for (i, name) in targets.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(INTER_PROBE_GAP).await;
            }

            match discovery::probe_printer(name).await {
                Ok(status) => {
                    self.registry.record_probe_success(name, status);
                }
                Err(e) => {
                    debug!(printer = %name, error = %e, "health probe failed");
                    self.registry.record_probe_failure(name);
                }
            }
        }
    }
}
