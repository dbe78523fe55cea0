//! Queue health classification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::queue::QueueStats;

/// Health tier derived from a stats snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueHealth {
    #[default]
    Healthy,
    Degraded,
    Critical,
}

impl fmt::Display for QueueHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueueHealth::Healthy => "healthy",
            QueueHealth::Degraded => "degraded",
            QueueHealth::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Cut-offs used by [`classify`]. All comparisons are strict (`>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    pub critical_failure_rate: f64,
    pub critical_processing_time_ms: f64,
    pub degraded_failure_rate: f64,
    pub degraded_processing_time_ms: f64,
    pub degraded_queue_length: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            critical_failure_rate: 0.5,
            critical_processing_time_ms: 180_000.0,
            degraded_failure_rate: 0.2,
            degraded_processing_time_ms: 90_000.0,
            degraded_queue_length: 30,
        }
    }
}

/// Map a snapshot to a health tier. Pure; the stored `queue_health` field of
/// `stats` is ignored.
pub fn classify(stats: &QueueStats, thresholds: &HealthThresholds) -> QueueHealth {
    let failure_rate = stats.failure_rate();
    let avg = stats.average_processing_time_ms;

    if failure_rate > thresholds.critical_failure_rate
        || avg > thresholds.critical_processing_time_ms
    {
        return QueueHealth::Critical;
    }
    if failure_rate > thresholds.degraded_failure_rate
        || avg > thresholds.degraded_processing_time_ms
        || stats.queue_length() > thresholds.degraded_queue_length
    {
        return QueueHealth::Degraded;
    }
    QueueHealth::Healthy
}
