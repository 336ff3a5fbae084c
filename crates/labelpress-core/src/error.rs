// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Unified error types for Labelpress.

use thiserror::Error;

/// Top-level error type for all Labelpress operations.
#[derive(Debug, Error)]
pub enum LabelpressError {
    // -- Admission errors --
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("print queue is full")]
    QueueFull,

    // -- Printer availability --
    #[error("printer unavailable: {0}")]
    UnavailablePrinter(String),

    #[error("circuit breaker open for printer {0}")]
    BreakerOpen(String),

    // -- Rendering --
    #[error("renderer unavailable: {0}")]
    RendererUnavailable(String),

    #[error("render timed out")]
    RenderTimeout,

    #[error("render failed: {0}")]
    RenderFailed(String),

    // -- Spooling --
    #[error("spool failed: {0}")]
    SpoolFailed(String),

    // -- Scheduling --
    #[error("job exceeded its processing deadline")]
    ProcessingTimeout,

    #[error("job cancelled during shutdown")]
    Cancelled,

    // -- Infrastructure --
    #[error("printer discovery failed: {0}")]
    Discovery(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Classification of errors for retry decisions.
///
/// Transient errors may be retried by the scheduler; permanent errors fail
/// the job on the spot. Printer-availability and deadline errors are
/// permanent on purpose: the dispatcher never burns retries on a printer
/// that the registry or breaker already ruled out, and a job that blew its
/// hard deadline is not silently re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

impl LabelpressError {
    /// Classify this error for the retry engine.
    pub fn class(&self) -> ErrorClass {
        match self {
            // Transient — renderer hiccups, spool glitches, I/O
            Self::RendererUnavailable(_)
            | Self::RenderTimeout
            | Self::RenderFailed(_)
            | Self::SpoolFailed(_)
            | Self::Discovery(_)
            | Self::Io(_) => ErrorClass::Transient,

            // Permanent — bad input, capacity, ruled-out printers, deadlines
            Self::Validation(_)
            | Self::QueueFull
            | Self::UnavailablePrinter(_)
            | Self::BreakerOpen(_)
            | Self::ProcessingTimeout
            | Self::Cancelled
            | Self::Serialization(_) => ErrorClass::Permanent,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LabelpressError>;
