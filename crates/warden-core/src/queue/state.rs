//! Mutable queue state: pending heap, running count, pause flag, stats.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::record::ErasedTask;
use super::stats::{QueueStats, StatsTracker};
use crate::domain::{HealthThresholds, QueueHealth, classify};

/// Pending heap entry.
///
/// Ordered by priority weight (higher first), then by submission sequence
/// (lower first), so BinaryHeap::pop yields the next task to dispatch.
pub(crate) struct PendingTask {
    weight: u8,
    seq: u64,
    task: Box<dyn ErasedTask>,
}

impl PartialEq for PendingTask {
    fn eq(&self, other: &Self) -> bool {
        self.weight == other.weight && self.seq == other.seq
    }
}

impl Eq for PendingTask {}

impl PartialOrd for PendingTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weight
            .cmp(&other.weight)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub(crate) struct QueueState {
    pending: BinaryHeap<PendingTask>,
    running: usize,
    paused: bool,
    next_seq: u64,
    pub(crate) stats: StatsTracker,
}

impl QueueState {
    pub(crate) fn new(stats_window: usize) -> Self {
        Self {
            pending: BinaryHeap::new(),
            running: 0,
            paused: false,
            next_seq: 0,
            stats: StatsTracker::new(stats_window),
        }
    }

    pub(crate) fn queue_length(&self) -> usize {
        self.pending.len() + self.running
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused
    }

    /// Returns whether the flag changed.
    pub(crate) fn set_paused(&mut self, paused: bool) -> bool {
        let changed = self.paused != paused;
        self.paused = paused;
        changed
    }

    /// Push an admitted task. Capacity is checked by the caller.
    pub(crate) fn admit(&mut self, task: Box<dyn ErasedTask>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let weight = task.meta().priority.weight();
        self.pending.push(PendingTask { weight, seq, task });
    }

    /// Pop the next task and take a running slot for it, unless paused or
    /// all `concurrency` slots are taken.
    pub(crate) fn next_dispatch(&mut self, concurrency: usize) -> Option<Box<dyn ErasedTask>> {
        if self.paused || self.running >= concurrency {
            return None;
        }
        let entry = self.pending.pop()?;
        self.running += 1;
        Some(entry.task)
    }

    /// Give back a running slot.
    pub(crate) fn release_slot(&mut self) {
        debug_assert!(self.running > 0, "release without a running task");
        self.running = self.running.saturating_sub(1);
    }

    /// Remove every pending task, in dispatch order.
    pub(crate) fn drain_pending(&mut self) -> Vec<Box<dyn ErasedTask>> {
        let mut drained = Vec::with_capacity(self.pending.len());
        while let Some(entry) = self.pending.pop() {
            drained.push(entry.task);
        }
        drained
    }

    pub(crate) fn snapshot(&self, thresholds: &HealthThresholds) -> QueueStats {
        let mut stats = QueueStats {
            pending: self.pending.len(),
            running: self.running,
            completed: self.stats.completed(),
            failed: self.stats.failed(),
            total_processed: self.stats.total_processed(),
            average_processing_time_ms: self.stats.average_processing_time_ms(),
            queue_health: QueueHealth::Healthy,
        };
        stats.queue_health = classify(&stats, thresholds);
        stats
    }
}
