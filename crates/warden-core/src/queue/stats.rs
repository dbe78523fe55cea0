//! Rolling statistics for the queue.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::QueueHealth;

/// Counters plus a fixed-size window of recent processing durations.
///
/// Lives inside the queue state and is only touched under the queue lock, so
/// every update is atomic with the dispatch/settle transition that caused it.
#[derive(Debug, Clone)]
pub struct StatsTracker {
    completed: u64,
    failed: u64,
    total_processed: u64,
    window: VecDeque<Duration>,
    window_sum: Duration,
    capacity: usize,
}

impl StatsTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            completed: 0,
            failed: 0,
            total_processed: 0,
            window: VecDeque::with_capacity(capacity),
            window_sum: Duration::ZERO,
            capacity,
        }
    }

    /// A task completed successfully after `elapsed`.
    pub fn record_success(&mut self, elapsed: Duration) {
        self.completed += 1;
        self.total_processed += 1;

        if self.window.len() == self.capacity
            && let Some(evicted) = self.window.pop_front()
        {
            self.window_sum -= evicted;
        }
        self.window.push_back(elapsed);
        self.window_sum += elapsed;
    }

    pub fn record_failure(&mut self) {
        self.record_failures(1);
    }

    pub fn record_failures(&mut self, n: u64) {
        self.failed += n;
        self.total_processed += n;
    }

    /// Mean of the samples currently in the window, in milliseconds.
    pub fn average_processing_time_ms(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window_sum.as_nanos() as f64 / self.window.len() as f64 / 1_000_000.0
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn total_processed(&self) -> u64 {
        self.total_processed
    }

    pub fn samples(&self) -> usize {
        self.window.len()
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.capacity);
    }
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub completed: u64,
    pub failed: u64,
    pub total_processed: u64,
    pub average_processing_time_ms: f64,
    pub queue_health: QueueHealth,
}

impl QueueStats {
    /// Logical queue length: everything admitted and not yet settled.
    pub fn queue_length(&self) -> usize {
        self.pending + self.running
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total_processed == 0 {
            return 0.0;
        }
        self.failed as f64 / self.total_processed as f64
    }
}

/// Stats plus the queue's static configuration and pause flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedStatus {
    #[serde(flatten)]
    pub stats: QueueStats,
    pub concurrency: usize,
    pub max_queue_size: usize,
    pub default_timeout_ms: u64,
    pub is_paused: bool,
}
