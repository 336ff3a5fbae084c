// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Zebra media reset.
//
// Wristband printers occasionally lose their media calibration after a
// jam. This sends the printer a fixed ZPL sequence that restores darkness,
// media tracking, and label geometry to the wristband defaults. Delivery
// is file-copy to the printer share name, which is how raw ZPL reaches a
// Windows-attached Zebra without a driver round-trip.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, warn};

use labelpress_core::error::{LabelpressError, Result};

use crate::spooler::unique_file_name;

/// ZPL lines sent to reset wristband media settings. Order matters; the
/// trailing `^JUS` persists the configuration to the printer's flash.
pub const RESET_MEDIA_SEQUENCE: &[&str] = &[
    "~SD20", "~JSN", "^XA", "^SZ2", "^PW203", "^LL2030", "^POI", "^PMN", "^MNM", "^LS0", "^MTT",
    "^MMT,N", "^MPE", "^XZ", "^XA^JUS^XZ",
];

/// Wall-clock cap on the copy command.
const COPY_TIMEOUT: Duration = Duration::from_secs(10);

/// The full payload as written to disk.
pub fn reset_payload() -> String {
    let mut payload = RESET_MEDIA_SEQUENCE.join("\r\n");
    payload.push_str("\r\n");
    payload
}

/// Send the media-reset sequence to the named printer.
pub async fn reset_media(work_dir: &Path, printer_name: &str) -> Result<()> {
    tokio::fs::create_dir_all(work_dir).await?;
    let path = work_dir.join(unique_file_name("zpl"));
    tokio::fs::write(&path, reset_payload()).await?;

    info!(printer = printer_name, "sending media reset sequence");

    let mut command = Command::new("cmd");
    command
        .arg("/C")
        .arg("copy")
        .arg("/B")
        .arg(&path)
        .arg(printer_name)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let result = match tokio::time::timeout(COPY_TIMEOUT, command.output()).await {
        Err(_) => Err(LabelpressError::SpoolFailed(format!(
            "media reset copy timed out after {}s",
            COPY_TIMEOUT.as_secs()
        ))),
        Ok(Err(e)) => Err(LabelpressError::SpoolFailed(format!("spawn copy: {e}"))),
        Ok(Ok(output)) => Ok(output),
    };

    if let Err(e) = tokio::fs::remove_file(&path).await {
        warn!(path = %path.display(), error = %e, "media reset temp cleanup failed");
    }

    let output = result?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(LabelpressError::SpoolFailed(format!(
            "media reset copy exited with {}: {}",
            output.status,
            stderr.trim()
        )))
    }
}
