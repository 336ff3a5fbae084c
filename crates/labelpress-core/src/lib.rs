// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Labelpress — Core types, error taxonomy, and configuration shared across
// all crates.

pub mod capability;
pub mod config;
pub mod error;
pub mod pagecss;
pub mod types;

pub use config::Config;
pub use error::LabelpressError;
pub use types::*;
