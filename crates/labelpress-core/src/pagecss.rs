// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Print CSS injection.
//
// Rendered labels must come out sized exactly to the media, so documents
// that carry no print styling of their own get an `@page` rule prepended
// with the label's dimensions and margins. Documents that already declare
// `@media print` or `@page` are left untouched; the author knew what they
// were doing.

use crate::types::PageGeometry;

/// Returns true when the document already carries its own print styling.
pub fn has_print_css(html: &str) -> bool {
    html.contains("@media print") || html.contains("@page")
}

/// Prepend an `@page` style block matching the geometry, unless the
/// document already declares print CSS.
pub fn inject_page_css(html: &str, geometry: &PageGeometry) -> String {
    if has_print_css(html) {
        return html.to_owned();
    }

    let style = format!(
        "<style>@page {{ size: {} {}; margin: {} {} {} {}; }} \
         html, body {{ margin: 0; padding: 0; }}</style>",
        geometry.width,
        geometry.height,
        geometry.margin.top,
        geometry.margin.right,
        geometry.margin.bottom,
        geometry.margin.left,
    );

    // Inside <head> when there is one, otherwise in front of the document.
    if let Some(pos) = html.find("<head>") {
        let insert_at = pos + "<head>".len();
        let mut out = String::with_capacity(html.len() + style.len());
        out.push_str(&html[..insert_at]);
        out.push_str(&style);
        out.push_str(&html[insert_at..]);
        out
    } else {
        format!("{style}{html}")
    }
}
