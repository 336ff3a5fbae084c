// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// HTTP API.
//
// All routes live under `/api/print`. Every route runs under a hard
// timeout that maps to 504, and CORS is applied from the configured
// allow-list. Handlers never block on OS calls; the printers endpoint
// degrades to an empty list with a warning rather than hang a request
// thread on a wedged enumeration.

use std::time::{Duration, Instant};

use axum::error_handling::HandleErrorLayer;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde_json::json;
use tower::{BoxError, ServiceBuilder};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;
use uuid::Uuid;

use labelpress_core::types::{JobId, PrinterStatus};
use labelpress_print::{discovery, zebra};

use crate::state::SharedState;
use crate::submit;

/// Hard per-route deadline.
const ROUTE_TIMEOUT: Duration = Duration::from_secs(15);

/// Build the API router.
pub fn router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .route("/api/print/submit", post(submit_batch))
        .route("/api/print/status/:job_id", get(job_status))
        .route("/api/print/metrics", get(metrics))
        .route("/api/print/printers", get(printers))
        .route("/api/print/zebra/reset-media/:printer_name", post(zebra_reset))
        .route("/api/print/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .timeout(ROUTE_TIMEOUT),
        )
        .layer(cors)
        .with_state(state)
}

/// POST /api/print/submit — validate a batch and admit per-label jobs.
async fn submit_batch(
    State(state): State<SharedState>,
    Json(request): Json<submit::SubmitRequest>,
) -> Response {
    let started = Instant::now();

    if let Err(e) = submit::validate(&request) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": e.to_string(),
                "processingTime": started.elapsed().as_millis() as u64,
            })),
        )
            .into_response();
    }

    let outcome = submit::admit_batch(&state, request).await;
    let status = if outcome.failed_labels.is_empty() {
        StatusCode::OK
    } else if outcome.successful_jobs.is_empty() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::MULTI_STATUS
    };

    (
        status,
        Json(json!({
            "successfulJobs": outcome.successful_jobs,
            "failedLabels": outcome.failed_labels,
            "processingTime": started.elapsed().as_millis() as u64,
        })),
    )
        .into_response()
}

/// GET /api/print/status/:job_id — one job across all lifecycle buckets.
async fn job_status(State(state): State<SharedState>, Path(job_id): Path<String>) -> Response {
    let Ok(uuid) = Uuid::parse_str(&job_id) else {
        return not_found(&job_id);
    };

    match state.queue.get(JobId(uuid)) {
        Some(job) => (StatusCode::OK, Json(json!({ "job": job }))).into_response(),
        None => not_found(&job_id),
    }
}

fn not_found(job_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("job {job_id} not found") })),
    )
        .into_response()
}

/// GET /api/print/metrics — last-computed snapshot plus renderer stats.
async fn metrics(State(state): State<SharedState>) -> Response {
    let snapshot = state.metrics.snapshot();
    let renderer = state.renderer.status();

    Json(json!({
        "metrics": snapshot,
        "performance": {
            "avgProcessingMs": snapshot.avg_processing_ms,
            "renderer": renderer,
        },
        "timestamp": Utc::now(),
    }))
    .into_response()
}

/// GET /api/print/printers — registry snapshot, with on-demand discovery
/// when the registry is still empty.
async fn printers(State(state): State<SharedState>) -> Response {
    let mut records = state.registry.list();

    if records.is_empty() {
        match discovery::enumerate_printers().await {
            Ok(discovered) => {
                state.registry.merge_discovered(discovered);
                records = state.registry.list();
            }
            Err(e) => {
                warn!(error = %e, "printer discovery degraded to empty list");
                return Json(json!({
                    "printers": [],
                    "totalPrinters": 0,
                    "onlinePrinters": 0,
                    "warning": "discovery timed out",
                }))
                .into_response();
            }
        }
    }

    let online = records
        .iter()
        .filter(|r| r.status == PrinterStatus::Online)
        .count();

    Json(json!({
        "printers": records,
        "totalPrinters": records.len(),
        "onlinePrinters": online,
    }))
    .into_response()
}

/// POST /api/print/zebra/reset-media/:printer_name — send the wristband
/// media-reset sequence to a known, online printer.
async fn zebra_reset(
    State(state): State<SharedState>,
    Path(printer_name): Path<String>,
) -> Response {
    let Some(record) = state.registry.get(&printer_name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("printer {printer_name} not found") })),
        )
            .into_response();
    };

    if record.status != PrinterStatus::Online {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": format!("printer {printer_name} is {:?}", record.status),
            })),
        )
            .into_response();
    }

    match zebra::reset_media(&state.config.spool_dir, &printer_name).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "success": true, "printerName": printer_name })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// GET /api/print/health — liveness with uptime and memory.
async fn health(State(state): State<SharedState>) -> Response {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "uptime": state.started_at.elapsed().as_secs(),
        "memory": { "rssBytes": rss_bytes() },
    }))
    .into_response()
}

/// Resident set size where the platform exposes it cheaply; informational.
fn rss_bytes() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(statm) = std::fs::read_to_string("/proc/self/statm") {
            if let Some(rss_pages) = statm
                .split_whitespace()
                .nth(1)
                .and_then(|v| v.parse::<u64>().ok())
            {
                return rss_pages * 4096;
            }
        }
    }
    0
}

/// Map middleware failures: a blown route deadline becomes 504.
async fn handle_middleware_error(error: BoxError) -> Response {
    if error.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({ "error": "request timed out" })),
        )
            .into_response()
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": error.to_string() })),
        )
            .into_response()
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
