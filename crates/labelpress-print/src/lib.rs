// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Labelpress Print — printer registry with a background health loop,
// per-printer circuit breakers, and delivery of rendered PDFs to the OS
// spooler. This crate owns everything that talks to the Windows print
// stack; nothing here renders.

pub mod breaker;
pub mod discovery;
pub mod health;
pub mod registry;
pub mod spooler;
pub mod zebra;

pub use breaker::{BreakerConfig, BreakerRegistry, BreakerState};
pub use health::HealthMonitor;
pub use registry::PrinterRegistry;
pub use spooler::Spooler;
