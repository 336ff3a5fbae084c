// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// OS printer enumeration.
//
// Printers are discovered by invoking the Windows spooler's PowerShell
// cmdlets and parsing their JSON output. Every invocation carries a hard
// timeout with kill-on-timeout semantics: the enumeration command can
// wedge for minutes when the spooler service is unhappy, and a wedged
// discovery must degrade to an empty registry instead of hanging the
// caller.

use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use labelpress_core::error::{LabelpressError, Result};
use labelpress_core::types::{PrinterRecord, PrinterStatus};

/// Hard cap on the full-enumeration command.
pub const ENUMERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Hard cap on a single-printer probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// One printer as reported by `Get-Printer | ConvertTo-Json`.
#[derive(Debug, Deserialize)]
struct RawPrinter {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "PrinterStatus")]
    status: Option<i64>,
    #[serde(rename = "DriverName")]
    driver: Option<String>,
    #[serde(rename = "PortName")]
    port: Option<String>,
}

/// `ConvertTo-Json` emits a bare object for a single result and an array
/// for several; accept both.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPrinterDoc {
    One(RawPrinter),
    Many(Vec<RawPrinter>),
}

impl RawPrinterDoc {
    fn into_vec(self) -> Vec<RawPrinter> {
        match self {
            Self::One(p) => vec![p],
            Self::Many(v) => v,
        }
    }
}

/// Enumerate all OS printers. A command timeout or unparsable output is an
/// error for the caller to degrade on, never a panic.
pub async fn enumerate_printers() -> Result<Vec<PrinterRecord>> {
    let stdout = run_powershell(
        "Get-Printer | Select-Object Name,PrinterStatus,DriverName,PortName | ConvertTo-Json -Compress",
        ENUMERATION_TIMEOUT,
    )
    .await?;

    let records = parse_printer_doc(&stdout)?;
    debug!(count = records.len(), "printer enumeration complete");
    Ok(records)
}

/// Probe a single printer's status by name.
pub async fn probe_printer(name: &str) -> Result<PrinterStatus> {
    // Single quotes keep the name inert inside the PowerShell string;
    // embedded quotes are doubled per PowerShell quoting rules.
    let escaped = name.replace('\'', "''");
    let stdout = run_powershell(
        &format!(
            "Get-Printer -Name '{escaped}' | Select-Object Name,PrinterStatus,DriverName,PortName | ConvertTo-Json -Compress"
        ),
        PROBE_TIMEOUT,
    )
    .await?;

    let records = parse_printer_doc(&stdout)?;
    records
        .into_iter()
        .next()
        .map(|r| r.status)
        .ok_or_else(|| LabelpressError::Discovery(format!("printer {name} not reported")))
}

/// Parse the enumeration JSON into registry records. An empty document
/// (no printers installed) parses to an empty list.
pub fn parse_printer_doc(doc: &str) -> Result<Vec<PrinterRecord>> {
    let trimmed = doc.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let raw: RawPrinterDoc = serde_json::from_str(trimmed)
        .map_err(|e| LabelpressError::Discovery(format!("unparsable enumeration output: {e}")))?;

    Ok(raw
        .into_vec()
        .into_iter()
        .map(|p| {
            let status = p.status.map(PrinterStatus::from_code).unwrap_or(PrinterStatus::Offline);
            let mut record = PrinterRecord::new(p.name, status);
            record.driver = p.driver;
            record.port = p.port;
            record
        })
        .collect())
}

/// Run a PowerShell command with a hard timeout. The child is killed when
/// the deadline passes; the callee is never trusted to bound itself.
async fn run_powershell(script: &str, deadline: Duration) -> Result<String> {
    let mut command = Command::new("powershell");
    command
        .args(["-NoProfile", "-NonInteractive", "-Command", script])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(deadline, command.output())
        .await
        .map_err(|_| {
            warn!(timeout_secs = deadline.as_secs(), "printer command timed out");
            LabelpressError::Discovery(format!(
                "enumeration command timed out after {}s",
                deadline.as_secs()
            ))
        })?
        .map_err(|e| LabelpressError::Discovery(format!("spawn enumeration command: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(LabelpressError::Discovery(format!(
            "enumeration command exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
