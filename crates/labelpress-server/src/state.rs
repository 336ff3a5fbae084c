// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Shared application state.
//
// Built exactly once in `main` and handed to every handler. The renderer
// is held as a supplied capability: handlers and the dispatcher invoke it,
// only the pool itself manages the browser process.

use std::sync::Arc;
use std::time::Instant;

use labelpress_core::config::Config;
use labelpress_print::breaker::BreakerRegistry;
use labelpress_print::registry::PrinterRegistry;
use labelpress_queue::{MetricsAggregator, PriorityQueue};
use labelpress_render::RendererPool;

pub struct AppState {
    pub config: Config,
    pub queue: Arc<PriorityQueue>,
    pub registry: Arc<PrinterRegistry>,
    pub breakers: Arc<BreakerRegistry>,
    pub renderer: Arc<RendererPool>,
    pub metrics: Arc<MetricsAggregator>,
    pub started_at: Instant,
}

pub type SharedState = Arc<AppState>;
