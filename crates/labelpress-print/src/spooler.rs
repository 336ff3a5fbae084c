// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Spooler invocation.
//
// Writes rendered PDF bytes to a uniquely named temp file and hands it to
// the external PDF-to-printer binary. The invoker is stateless and
// re-entrant; any number of copies may spool concurrently, so temp names
// must never collide. Cleanup is deferred a moment so the spooler can
// finish reading the file, and a failed delete is only ever logged.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use labelpress_core::capability::SpoolSink;
use labelpress_core::error::{LabelpressError, Result};

/// Wall-clock cap on one spooler invocation.
const SPOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay before a spooled temp file is deleted.
const CLEANUP_DELAY: Duration = Duration::from_secs(2);

/// Invokes the external PDF-to-printer binary.
#[derive(Debug, Clone)]
pub struct Spooler {
    spooler_path: PathBuf,
    work_dir: PathBuf,
}

impl Spooler {
    pub fn new(spooler_path: PathBuf, work_dir: PathBuf) -> Self {
        Self {
            spooler_path,
            work_dir,
        }
    }

    /// Spool PDF bytes to the named printer.
    pub async fn spool(&self, pdf: &[u8], printer_name: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.work_dir).await?;

        let path = self.work_dir.join(unique_file_name("pdf"));
        tokio::fs::write(&path, pdf).await?;
        debug!(path = %path.display(), printer = printer_name, bytes = pdf.len(), "spooling pdf");

        let result = self.invoke(&path, printer_name).await;
        schedule_cleanup(path);
        result
    }

    async fn invoke(&self, pdf_path: &Path, printer_name: &str) -> Result<()> {
        let mut command = Command::new(&self.spooler_path);
        command
            .arg(pdf_path)
            .arg(printer_name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(SPOOL_TIMEOUT, command.output())
            .await
            .map_err(|_| {
                LabelpressError::SpoolFailed(format!(
                    "spooler timed out after {}s for printer {printer_name}",
                    SPOOL_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| {
                LabelpressError::SpoolFailed(format!(
                    "spawn {}: {e}",
                    self.spooler_path.display()
                ))
            })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(LabelpressError::SpoolFailed(format!(
                "spooler exited with {} for printer {printer_name}: {}",
                output.status,
                stderr.trim()
            )))
        }
    }
}

impl SpoolSink for Spooler {
    async fn spool(&self, pdf: Vec<u8>, printer_name: String) -> Result<()> {
        Spooler::spool(self, &pdf, &printer_name).await
    }
}

/// Collision-free temp file name: millisecond timestamp plus a random
/// UUID suffix (well past the required 48 bits of entropy).
pub fn unique_file_name(extension: &str) -> String {
    format!(
        "{}-{}.{extension}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}

/// Delete the temp file after a short grace period. Failures are logged,
/// never surfaced.
fn schedule_cleanup(path: PathBuf) {
    tokio::spawn(async move {
        tokio::time::sleep(CLEANUP_DELAY).await;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "spool temp cleanup failed");
        }
    });
}
