// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Labelpress — local HTTP print-job server.
//
// Entry point and composition root. Everything is constructed exactly once
// here and passed down explicitly; there are no globals. Teardown runs in
// reverse: stop admitting, cancel background loops, drain the dispatcher,
// close the browser.

mod app;
mod routes;
mod state;
mod submit;

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use labelpress_core::config::Config;
use labelpress_print::breaker::BreakerRegistry;
use labelpress_print::discovery;
use labelpress_print::health::HealthMonitor;
use labelpress_print::registry::PrinterRegistry;
use labelpress_print::spooler::Spooler;
use labelpress_queue::{
    Dispatcher, DispatcherConfig, MetricsAggregator, PriorityQueue, QueueConfig,
};
use labelpress_render::{RendererConfig, RendererPool};

use crate::app::App;
use crate::state::AppState;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = App::parse().into_config();

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.build().expect("tokio runtime");
    runtime.block_on(run(config));
}

async fn run(config: Config) {
    info!(
        host = %config.host,
        port = config.port,
        max_queue_size = config.max_queue_size,
        max_concurrent_jobs = config.max_concurrent_jobs,
        spooler = %config.spooler_path.display(),
        "labelpress starting"
    );

    let breakers = Arc::new(BreakerRegistry::default());
    let registry = Arc::new(PrinterRegistry::new(Arc::clone(&breakers)));

    // Initial discovery. A wedged or absent spooler service degrades to an
    // empty registry; the health loop and the printers endpoint will keep
    // trying.
    match discovery::enumerate_printers().await {
        Ok(records) => {
            info!(count = records.len(), "initial printer discovery complete");
            registry.merge_discovered(records);
        }
        Err(e) => warn!(error = %e, "initial discovery failed, starting with empty registry"),
    }

    let renderer = Arc::new(RendererPool::new(RendererConfig::default()));
    let queue = Arc::new(PriorityQueue::new(QueueConfig {
        max_size: config.max_queue_size,
        max_retries: config.max_retries,
        retry_delay: config.retry_delay,
        ..Default::default()
    }));
    let metrics = Arc::new(MetricsAggregator::new());
    let spooler = Arc::new(Spooler::new(
        config.spooler_path.clone(),
        config.spool_dir.clone(),
    ));

    let cancel = CancellationToken::new();

    let health = Arc::new(HealthMonitor::new(
        Arc::clone(&registry),
        config.effective_health_interval(),
    ));
    let health_handle = health.spawn(cancel.clone());
    let heartbeat_handle = Arc::clone(&renderer).spawn_heartbeat(cancel.clone());
    let metrics_handle = Arc::clone(&metrics).spawn(
        Arc::clone(&queue),
        Arc::clone(&registry),
        cancel.clone(),
    );

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&queue),
        Arc::clone(&registry),
        Arc::clone(&breakers),
        Arc::clone(&renderer),
        spooler,
        DispatcherConfig {
            max_concurrent_jobs: config.max_concurrent_jobs,
            batch_size: config.batch_size,
            processing_timeout: config.processing_timeout,
            ..Default::default()
        },
    ));
    let dispatcher_handle = dispatcher.spawn(cancel.clone());

    let state = Arc::new(AppState {
        config: config.clone(),
        queue,
        registry,
        breakers,
        renderer: Arc::clone(&renderer),
        metrics,
        started_at: Instant::now(),
    });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("bind HTTP listener");
    info!(%addr, "labelpress listening");

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("HTTP server error");

    info!("shutdown requested");
    cancel.cancel();

    // The dispatcher honors the shutdown grace before force-cancelling.
    let _ = dispatcher_handle.await;
    let _ = tokio::join!(health_handle, heartbeat_handle, metrics_handle);
    renderer.shutdown().await;
    info!("labelpress stopped");
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
