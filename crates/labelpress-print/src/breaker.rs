// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Per-printer circuit breakers.
//
// If a printer is repeatedly failing, stop feeding it jobs that will just
// time out. The circuit opens after enough failures inside the monitoring
// window, rejects admission until the reset timeout elapses, then lets
// probe traffic through half-open. A run of successes closes it again.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use labelpress_core::error::{LabelpressError, Result};

/// Circuit breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failures inside the window before the circuit opens.
    pub failure_threshold: u32,
    /// Failures older than this no longer count toward the threshold.
    pub monitoring_window: Duration,
    /// How long an open circuit rejects calls before going half-open.
    pub reset_timeout: Duration,
    /// Consecutive half-open successes required to close.
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            monitoring_window: Duration::from_secs(5 * 60),
            reset_timeout: Duration::from_secs(60),
            success_threshold: 3,
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation — calls pass through.
    Closed,
    /// Too many failures — calls are rejected until the reset timeout.
    Open,
    /// Reset timeout expired — probe traffic allowed through.
    HalfOpen,
}

/// Per-printer breaker bookkeeping.
#[derive(Debug)]
struct Breaker {
    state: BreakerState,
    /// Timestamps of recent failures; pruned to the monitoring window.
    failures: VecDeque<Instant>,
    /// Consecutive successes while half-open.
    successes: u32,
    /// When an open circuit next admits a call.
    next_attempt: Option<Instant>,
}

impl Default for Breaker {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            failures: VecDeque::new(),
            successes: 0,
            next_attempt: None,
        }
    }
}

impl Breaker {
    fn prune(&mut self, window: Duration, now: Instant) {
        while let Some(oldest) = self.failures.front() {
            if now.duration_since(*oldest) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Breakers for all known printers, keyed by printer name.
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Breaker>>,
    config: BreakerConfig,
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Admission gate. Performs the open → half-open transition when the
    /// reset timeout has elapsed; rejects with `BreakerOpen` otherwise.
    pub fn check(&self, printer: &str) -> Result<()> {
        let mut map = self.breakers.lock().expect("breaker map lock poisoned");
        let breaker = map.entry(printer.to_owned()).or_default();
        let now = Instant::now();

        match breaker.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let due = breaker.next_attempt.is_none_or(|t| now >= t);
                if due {
                    info!(printer, "circuit half-open, allowing probe traffic");
                    breaker.state = BreakerState::HalfOpen;
                    breaker.successes = 0;
                    Ok(())
                } else {
                    debug!(printer, "circuit open, rejecting call");
                    Err(LabelpressError::BreakerOpen(printer.to_owned()))
                }
            }
        }
    }

    /// Non-mutating availability view: closed and half-open are available;
    /// open is available only once the reset timeout has elapsed (the next
    /// `check` will transition).
    pub fn is_available(&self, printer: &str) -> bool {
        let map = self.breakers.lock().expect("breaker map lock poisoned");
        match map.get(printer) {
            None => true,
            Some(b) => match b.state {
                BreakerState::Closed | BreakerState::HalfOpen => true,
                BreakerState::Open => b.next_attempt.is_none_or(|t| Instant::now() >= t),
            },
        }
    }

    /// Record a successful printer interaction.
    pub fn record_success(&self, printer: &str) {
        let mut map = self.breakers.lock().expect("breaker map lock poisoned");
        let breaker = map.entry(printer.to_owned()).or_default();

        match breaker.state {
            BreakerState::Closed => {
                breaker.failures.clear();
            }
            BreakerState::HalfOpen => {
                breaker.successes += 1;
                if breaker.successes >= self.config.success_threshold {
                    info!(printer, "printer recovered, closing circuit");
                    *breaker = Breaker::default();
                }
            }
            // Success while open means a call slipped past the gate; the
            // state machine ignores it rather than rewarding it.
            BreakerState::Open => {}
        }
    }

    /// Record a failed printer interaction.
    pub fn record_failure(&self, printer: &str) {
        let mut map = self.breakers.lock().expect("breaker map lock poisoned");
        let breaker = map.entry(printer.to_owned()).or_default();
        let now = Instant::now();

        breaker.failures.push_back(now);
        breaker.prune(self.config.monitoring_window, now);

        match breaker.state {
            BreakerState::Closed => {
                if breaker.failures.len() as u32 >= self.config.failure_threshold {
                    warn!(
                        printer,
                        failures = breaker.failures.len(),
                        "opening circuit breaker"
                    );
                    breaker.state = BreakerState::Open;
                    breaker.next_attempt = Some(now + self.config.reset_timeout);
                }
            }
            BreakerState::HalfOpen => {
                warn!(printer, "probe failed, reopening circuit breaker");
                breaker.state = BreakerState::Open;
                breaker.successes = 0;
                breaker.next_attempt = Some(now + self.config.reset_timeout);
            }
            BreakerState::Open => {
                breaker.next_attempt = Some(now + self.config.reset_timeout);
            }
        }
    }

    /// Current state for a printer (Closed when never seen).
    pub fn state(&self, printer: &str) -> BreakerState {
        self.breakers
            .lock()
            .expect("breaker map lock poisoned")
            .get(printer)
            .map(|b| b.state)
            .unwrap_or(BreakerState::Closed)
    }
}
