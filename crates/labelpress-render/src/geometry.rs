// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// CSS length → inch conversion for the CDP print boundary.
//
// Callers express page geometry in whatever CSS dialect their templates
// use; Chromium's Page.printToPDF wants inches. Bare numbers are treated
// as inches, matching what label templates in the wild actually send.

use labelpress_core::error::{LabelpressError, Result};
use labelpress_core::types::{Margins, PageGeometry};

const MM_PER_INCH: f64 = 25.4;
const CSS_PX_PER_INCH: f64 = 96.0;

/// Parse a CSS length string ("2in", "54mm", "1.5cm", "203px", "2") into
/// inches.
pub fn length_to_inches(value: &str) -> Result<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LabelpressError::RenderFailed("empty length".into()));
    }

    let (number, factor) = if let Some(n) = trimmed.strip_suffix("in") {
        (n, 1.0)
    } else if let Some(n) = trimmed.strip_suffix("mm") {
        (n, 1.0 / MM_PER_INCH)
    } else if let Some(n) = trimmed.strip_suffix("cm") {
        (n, 10.0 / MM_PER_INCH)
    } else if let Some(n) = trimmed.strip_suffix("px") {
        (n, 1.0 / CSS_PX_PER_INCH)
    } else {
        (trimmed, 1.0)
    };

    let parsed: f64 = number
        .trim()
        .parse()
        .map_err(|_| LabelpressError::RenderFailed(format!("unparsable length {value:?}")))?;

    if !parsed.is_finite() || parsed < 0.0 {
        return Err(LabelpressError::RenderFailed(format!(
            "length out of range: {value:?}"
        )));
    }

    Ok(parsed * factor)
}

/// Page dimensions and margins in inches, ready for Page.printToPDF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageInches {
    pub width: f64,
    pub height: f64,
    pub margin_top: f64,
    pub margin_right: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub landscape: bool,
}

impl PageInches {
    pub fn from_geometry(geometry: &PageGeometry) -> Result<Self> {
        let Margins {
            top,
            right,
            bottom,
            left,
        } = &geometry.margin;

        Ok(Self {
            width: length_to_inches(&geometry.width)?,
            height: length_to_inches(&geometry.height)?,
            margin_top: length_to_inches(top)?,
            margin_right: length_to_inches(right)?,
            margin_bottom: length_to_inches(bottom)?,
            margin_left: length_to_inches(left)?,
            landscape: geometry.landscape,
        })
    }
}
