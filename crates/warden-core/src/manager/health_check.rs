//! Health report: classifier tier plus secondary heuristics, each issue paired
//! with a recommendation.

use serde::{Deserialize, Serialize};

use crate::config::ManagerConfig;
use crate::domain::QueueHealth;
use crate::queue::{DetailedStatus, QueueStats};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub is_healthy: bool,
    pub health: QueueHealth,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub is_paused: bool,
    pub stats: QueueStats,
}

/// Build a report from a status snapshot. No side effects.
pub fn evaluate(status: &DetailedStatus, config: &ManagerConfig) -> HealthReport {
    let stats = &status.stats;
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();
    let mut flag = |issue: String, recommendation: &str| {
        issues.push(issue);
        recommendations.push(recommendation.to_string());
    };

    if stats.queue_health != QueueHealth::Healthy {
        flag(
            format!("queue health is {}", stats.queue_health),
            "investigate the upstream dependency before load grows further",
        );
    }

    let queue_length = stats.queue_length();
    if queue_length > config.queue_length_critical {
        flag(
            format!("queue length critical: {queue_length}"),
            "consider an emergency pause or shedding load at the caller",
        );
    } else if queue_length > config.queue_length_warning {
        flag(
            format!("queue length elevated: {queue_length}"),
            "monitor closely; consider raising upstream capacity",
        );
    }

    let avg = stats.average_processing_time_ms;
    if avg > config.processing_time_critical_ms {
        flag(
            format!("average processing time critical: {avg:.0}ms"),
            "check upstream latency and reduce request size or timeout",
        );
    } else if avg > config.processing_time_warning_ms {
        flag(
            format!("average processing time elevated: {avg:.0}ms"),
            "watch upstream latency; prefer lighter requests",
        );
    }

    let failure_rate = stats.failure_rate();
    if failure_rate > config.failure_rate_warning {
        flag(
            format!("failure rate high: {:.1}%", failure_rate * 100.0),
            "inspect upstream errors and credentials; callers should back off",
        );
    }

    if status.is_paused {
        flag(
            "queue is paused".to_string(),
            "resume once the upstream has recovered",
        );
    }

    HealthReport {
        is_healthy: issues.is_empty(),
        health: stats.queue_health,
        issues,
        recommendations,
        is_paused: status.is_paused,
        stats: stats.clone(),
    }
}
