// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Submission adapter.
//
// Validates an incoming batch before anything is queued, then explodes it
// into one independent job per label. Each label is admitted under its own
// timeout; a label that cannot be admitted lands in `failedLabels` and
// never takes the rest of the batch down with it.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use labelpress_core::error::{LabelpressError, Result};
use labelpress_core::types::{JobId, PrintLabel, Priority};

use crate::state::AppState;

/// Hard cap on admitting a single label.
pub const LABEL_ADMISSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Valid copy count range.
const COPIES_RANGE: std::ops::RangeInclusive<u8> = 1..=10;

/// Incoming batch.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub labels: Vec<PrintLabel>,
    #[serde(default)]
    pub metadata: Option<SubmitMetadata>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmitMetadata {
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl SubmitRequest {
    pub fn priority(&self) -> Priority {
        self.metadata
            .as_ref()
            .and_then(|m| m.priority)
            .unwrap_or_default()
    }
}

/// One label that could not be admitted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedLabel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub printer_name: String,
    pub error: String,
}

/// Per-label admission result for the whole batch.
#[derive(Debug)]
pub struct SubmitOutcome {
    pub successful_jobs: Vec<JobId>,
    pub failed_labels: Vec<FailedLabel>,
}

/// Validate a batch. Runs before any queueing; the same invalid body
/// always produces the same error text.
pub fn validate(request: &SubmitRequest) -> Result<()> {
    if request.labels.is_empty() {
        return Err(LabelpressError::Validation(
            "batch must contain at least one label".into(),
        ));
    }

    let mut problems = Vec::new();
    for (i, label) in request.labels.iter().enumerate() {
        if label.printer_name.trim().is_empty() {
            problems.push(format!("label {i}: printerName is required"));
        }
        if label.width.trim().is_empty() {
            problems.push(format!("label {i}: width is required"));
        }
        if label.height.trim().is_empty() {
            problems.push(format!("label {i}: height is required"));
        }
        for (side, value) in [
            ("top", &label.margin.top),
            ("right", &label.margin.right),
            ("bottom", &label.margin.bottom),
            ("left", &label.margin.left),
        ] {
            if value.trim().is_empty() {
                problems.push(format!("label {i}: margin.{side} is required"));
            }
        }
        if !COPIES_RANGE.contains(&label.copies) {
            problems.push(format!(
                "label {i}: copies must be between 1 and 10, got {}",
                label.copies
            ));
        }
        if BASE64.decode(&label.html).is_err() {
            problems.push(format!("label {i}: htmlContent is not valid base64"));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(LabelpressError::Validation(problems.join("; ")))
    }
}

/// Admit every label of a validated batch as an independent job.
pub async fn admit_batch(state: &AppState, request: SubmitRequest) -> SubmitOutcome {
    let priority = request.priority();
    let mut successful_jobs = Vec::new();
    let mut failed_labels = Vec::new();

    for label in request.labels {
        let admission =
            tokio::time::timeout(LABEL_ADMISSION_TIMEOUT, admit_one(state, &label, priority)).await;

        match admission {
            Ok(Ok(id)) => {
                debug!(job_id = %id, printer = %label.printer_name, "label admitted");
                successful_jobs.push(id);
            }
            Ok(Err(e)) => failed_labels.push(failed_label(&label, e.to_string())),
            Err(_) => failed_labels.push(failed_label(
                &label,
                format!(
                    "admission timed out after {}s",
                    LABEL_ADMISSION_TIMEOUT.as_secs()
                ),
            )),
        }
    }

    state.metrics.record_admitted(successful_jobs.len() as u64);
    SubmitOutcome {
        successful_jobs,
        failed_labels,
    }
}

async fn admit_one(state: &AppState, label: &PrintLabel, priority: Priority) -> Result<JobId> {
    state.registry.availability(&label.printer_name)?;
    state.queue.admit(label.clone(), priority)
}

fn failed_label(label: &PrintLabel, error: String) -> FailedLabel {
    FailedLabel {
        user_id: label.user_id,
        name: label.name.clone(),
        printer_name: label.printer_name.clone(),
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    use labelpress_core::config::Config;
    use labelpress_core::types::{Margins, PrintMedia, PrinterStatus};
    use labelpress_print::breaker::BreakerRegistry;
    use labelpress_print::registry::PrinterRegistry;
    use labelpress_queue::{MetricsAggregator, PriorityQueue, QueueConfig};
    use labelpress_render::{RendererConfig, RendererPool};

    fn label(printer: &str) -> PrintLabel {
        PrintLabel {
            printer_name: printer.into(),
            html: BASE64.encode("<h1>hi</h1>"),
            media: PrintMedia::Label,
            margin: Margins::zero(),
            group: None,
            width: "2in".into(),
            height: "1in".into(),
            orientation: None,
            copies: 1,
            user_id: Some(7),
            name: Some("Visitor".into()),
        }
    }

    fn request(labels: Vec<PrintLabel>) -> SubmitRequest {
        SubmitRequest {
            labels,
            metadata: None,
        }
    }

    fn state() -> AppState {
        let breakers = Arc::new(BreakerRegistry::default());
        let registry = Arc::new(PrinterRegistry::new(Arc::clone(&breakers)));
        AppState {
            config: Config::default(),
            queue: Arc::new(PriorityQueue::new(QueueConfig::default())),
            registry,
            breakers,
            renderer: Arc::new(RendererPool::new(RendererConfig::default())),
            metrics: Arc::new(MetricsAggregator::new()),
            started_at: Instant::now(),
        }
    }

    #[test]
    fn empty_batch_is_rejected() {
        let err = validate(&request(vec![])).unwrap_err();
        assert!(err.to_string().contains("at least one label"));
    }

    #[test]
    fn copies_out_of_range_is_rejected() {
        let mut bad = label("P");
        bad.copies = 11;
        let err = validate(&request(vec![bad])).unwrap_err();
        assert!(err.to_string().contains("between 1 and 10"));

        let mut zero = label("P");
        zero.copies = 0;
        assert!(validate(&request(vec![zero])).is_err());
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let mut bad = label("P");
        bad.html = "not base64!!!".into();
        let err = validate(&request(vec![bad])).unwrap_err();
        assert!(err.to_string().contains("not valid base64"));
    }

    #[test]
    fn missing_required_strings_are_rejected() {
        let mut bad = label("");
        bad.width = " ".into();
        bad.margin.left = "".into();
        let err = validate(&request(vec![bad])).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("printerName is required"));
        assert!(text.contains("width is required"));
        assert!(text.contains("margin.left is required"));
    }

    #[test]
    fn validation_is_deterministic() {
        let mut bad = label("P");
        bad.copies = 0;
        bad.html = "???".into();
        let first = validate(&request(vec![bad.clone()])).unwrap_err().to_string();
        let second = validate(&request(vec![bad])).unwrap_err().to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn valid_batch_passes() {
        assert!(validate(&request(vec![label("P"), label("Q")])).is_ok());
    }

    #[tokio::test]
    async fn batch_accounting_covers_every_label() {
        let state = state();
        state.registry.set_status("P_OK", PrinterStatus::Online);

        let outcome = admit_batch(
            &state,
            request(vec![label("P_OK"), label("P_MISSING"), label("P_OK")]),
        )
        .await;

        assert_eq!(outcome.successful_jobs.len(), 2);
        assert_eq!(outcome.failed_labels.len(), 1);
        assert_eq!(outcome.failed_labels[0].printer_name, "P_MISSING");
        assert!(outcome.failed_labels[0].error.contains("not found"));
        assert_eq!(outcome.failed_labels[0].user_id, Some(7));
    }

    #[tokio::test]
    async fn queue_full_collects_into_failed_labels() {
        let breakers = Arc::new(BreakerRegistry::default());
        let registry = Arc::new(PrinterRegistry::new(Arc::clone(&breakers)));
        registry.set_status("P", PrinterStatus::Online);
        let state = AppState {
            queue: Arc::new(PriorityQueue::new(QueueConfig {
                max_size: 1,
                ..Default::default()
            })),
            registry,
            breakers,
            ..state()
        };

        let outcome = admit_batch(&state, request(vec![label("P"), label("P")])).await;
        assert_eq!(outcome.successful_jobs.len(), 1);
        assert_eq!(outcome.failed_labels.len(), 1);
        assert!(outcome.failed_labels[0].error.contains("queue is full"));
    }

    #[tokio::test]
    async fn offline_printer_label_fails_with_status() {
        let state = state();
        state.registry.set_status("P", PrinterStatus::Offline);

        let outcome = admit_batch(&state, request(vec![label("P")])).await;
        assert!(outcome.successful_jobs.is_empty());
        assert!(outcome.failed_labels[0].error.contains("Offline"));
    }

    #[test]
    fn metadata_priority_defaults_to_medium() {
        let req = request(vec![label("P")]);
        assert_eq!(req.priority(), Priority::Medium);

        let req = SubmitRequest {
            labels: vec![label("P")],
            metadata: Some(SubmitMetadata {
                priority: Some(Priority::High),
            }),
        };
        assert_eq!(req.priority(), Priority::High);
    }
}
