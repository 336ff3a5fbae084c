// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Job event broadcast.
//
// The queue publishes terminal and retry transitions on a bounded
// broadcast channel. Slow consumers lag and drop old events; they never
// back-pressure the queue.

use std::time::Duration;

use tokio::sync::broadcast;

use labelpress_core::types::JobId;

/// Default channel capacity. Lagging receivers skip ahead past this.
const DEFAULT_CAPACITY: usize = 256;

/// A job lifecycle event.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Completed {
        id: JobId,
        printer: String,
        duration_ms: u64,
    },
    Failed {
        id: JobId,
        printer: String,
        error: String,
    },
    Retry {
        id: JobId,
        attempt: u32,
        delay: Duration,
    },
}

/// Publish side of the job event channel.
pub struct JobEvents {
    tx: broadcast::Sender<JobEvent>,
}

impl Default for JobEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl JobEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. A send with no receivers is fine.
    pub fn emit(&self, event: JobEvent) {
        let _ = self.tx.send(event);
    }
}
