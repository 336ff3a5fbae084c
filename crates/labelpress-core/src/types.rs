// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Core domain types for the Labelpress print server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling priority of a print request.
///
/// High-priority jobs are dispatched before medium before low; within a
/// priority class dispatch order is FIFO by admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Numeric rank used for queue ordering (higher runs first).
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }
}

/// Media class of a label, as supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrintMedia {
    Wristband,
    Label,
}

/// Page orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Page margins as CSS length strings (e.g. "0.1in", "2mm").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margins {
    pub top: String,
    pub right: String,
    pub bottom: String,
    pub left: String,
}

impl Margins {
    pub fn zero() -> Self {
        Self {
            top: "0".into(),
            right: "0".into(),
            bottom: "0".into(),
            left: "0".into(),
        }
    }
}

/// One label to render and print. Immutable once admitted.
///
/// `html` is the base64-encoded HTML document; it is decoded by the
/// dispatcher immediately before rendering so that retries reuse the
/// original request body bit-for-bit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintLabel {
    pub printer_name: String,
    #[serde(rename = "htmlContent")]
    pub html: String,
    #[serde(rename = "printMedia")]
    pub media: PrintMedia,
    pub margin: Margins,
    #[serde(rename = "mpGroup", default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub width: String,
    pub height: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
    pub copies: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PrintLabel {
    /// Page geometry for the renderer, derived from this label's media size.
    pub fn geometry(&self) -> PageGeometry {
        PageGeometry {
            width: self.width.clone(),
            height: self.height.clone(),
            margin: self.margin.clone(),
            landscape: self.orientation == Some(Orientation::Landscape),
        }
    }
}

/// Page dimensions handed to the renderer. Lengths stay in the caller's
/// CSS dialect; the renderer converts them at the CDP boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageGeometry {
    pub width: String,
    pub height: String,
    pub margin: Margins,
    pub landscape: bool,
}

/// Scheduler envelope payload: one label plus its admission metadata.
/// Batches are exploded into one request per label at admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintRequest {
    pub id: JobId,
    pub label: PrintLabel,
    pub priority: Priority,
    pub submitted_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl PrintRequest {
    pub fn new(label: PrintLabel, priority: Priority) -> Self {
        Self {
            id: JobId::new(),
            label,
            priority,
            submitted_at: Utc::now(),
            retry_count: 0,
        }
    }
}

/// Lifecycle states of a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// A print job as tracked by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintJob {
    pub id: JobId,
    pub state: JobState,
    pub request: PrintRequest,
    #[serde(rename = "startTime")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "endTime")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(rename = "error", skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl PrintJob {
    pub fn new(request: PrintRequest) -> Self {
        Self {
            id: request.id,
            state: JobState::Queued,
            request,
            started_at: None,
            finished_at: None,
            last_error: None,
        }
    }

    /// Wall-clock processing duration, when both endpoints are recorded.
    pub fn processing_ms(&self) -> Option<u64> {
        let (start, end) = (self.started_at?, self.finished_at?);
        (end - start).num_milliseconds().try_into().ok()
    }
}

/// Observed status of an OS printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterStatus {
    Online,
    Offline,
    Busy,
    Error,
}

impl PrinterStatus {
    /// Map the OS enumeration's `PrinterStatus` integer. Unknown codes are
    /// treated as offline rather than guessed at.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Online,
            1 => Self::Offline,
            2 => Self::Error,
            _ => Self::Offline,
        }
    }
}

/// Cached state of one OS printer, keyed by name in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterRecord {
    pub name: String,
    pub port: Option<String>,
    pub driver: Option<String>,
    pub status: PrinterStatus,
    /// Jobs currently being processed against this printer.
    pub in_flight: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error_at: Option<DateTime<Utc>>,
    /// When the health loop last probed this printer.
    pub checked_at: Option<DateTime<Utc>>,
    pub cached_at: DateTime<Utc>,
}

impl PrinterRecord {
    pub fn new(name: String, status: PrinterStatus) -> Self {
        Self {
            name,
            port: None,
            driver: None,
            status,
            in_flight: 0,
            last_success: None,
            consecutive_failures: 0,
            last_error_at: None,
            checked_at: None,
            cached_at: Utc::now(),
        }
    }
}
