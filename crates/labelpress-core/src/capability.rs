// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Capability traits supplied to the scheduler.
//
// The dispatcher invokes rendering and spooling through these traits rather
// than owning the concrete components, so the renderer's process lifecycle
// stays with the pool and tests can substitute in-memory fakes.

use std::future::Future;

use crate::error::Result;
use crate::types::PageGeometry;

/// HTML → PDF conversion backed by an external headless-browser process.
pub trait Renderer: Send + Sync + 'static {
    /// Render an HTML document to PDF bytes sized per the geometry.
    fn render(
        &self,
        html: String,
        geometry: PageGeometry,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Whether the backing browser is currently usable.
    fn is_ready(&self) -> bool;

    /// Tear down and relaunch the backing browser.
    fn recycle(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Delivery of a finished PDF to a named OS printer.
pub trait SpoolSink: Send + Sync + 'static {
    /// Submit PDF bytes to the printer. Resolves once the spooler binary
    /// has exited (or its deadline has passed).
    fn spool(&self, pdf: Vec<u8>, printer_name: String) -> impl Future<Output = Result<()>> + Send;
}
