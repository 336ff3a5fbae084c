// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Labelpress contributors
//
// Labelpress Queue — the scheduling core: a bounded priority queue with
// retry scheduling and capped terminal retention, a concurrency-capped
// dispatcher that runs each job in an isolated task, job event broadcast,
// and the metrics aggregator observing both.

pub mod dispatcher;
pub mod events;
pub mod metrics;
pub mod queue;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use events::{JobEvent, JobEvents};
pub use metrics::{MetricsAggregator, MetricsSnapshot};
pub use queue::{JobOutcome, PriorityQueue, QueueConfig, QueueStatus};
