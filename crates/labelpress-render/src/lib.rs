// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Labelpress Render — owns the headless Chromium process and turns HTML
// label documents into PDFs sized exactly to the label media. The pool
// self-heals across browser crashes and hangs; callers only ever see
// `render` and `status`.

pub mod geometry;
pub mod pool;

pub use pool::{RendererConfig, RendererPool, RendererStatus};
