//! Queue manager: periodic monitoring, health checks, auto-remediation and
//! audited emergency controls on top of a [`TaskQueue`].
//!
//! The manager never touches queue internals. It reads snapshots and calls the
//! queue's public `pause` / `resume` / `clear`.

mod audit;
mod health_check;
mod monitor;

pub use audit::{AuditAction, AuditEntry};
pub use health_check::{HealthReport, evaluate};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::ManagerConfig;
use crate::domain::{AuditId, QueueHealth};
use crate::queue::{DetailedStatus, QueueStats, TaskQueue};
use audit::AuditLog;
use monitor::Monitor;

pub struct QueueManager {
    core: Arc<ManagerCore>,
    monitor: Mutex<Option<Monitor>>,
}

/// State shared with the monitor task. Holding this (not the manager) keeps
/// the manager droppable while the ticker runs.
pub(crate) struct ManagerCore {
    queue: TaskQueue,
    config: ManagerConfig,
    audit: Mutex<AuditLog>,
}

impl QueueManager {
    pub fn new(queue: TaskQueue, config: ManagerConfig) -> Self {
        let audit = AuditLog::new(config.audit_capacity);
        Self {
            core: Arc::new(ManagerCore {
                queue,
                config,
                audit: Mutex::new(audit),
            }),
            monitor: Mutex::new(None),
        }
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.core.queue
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.core.config
    }

    /// Start the background ticker: a status log every `interval` and a health
    /// check every `health_check_interval`. Returns `false` if already running.
    pub fn start_monitoring(&self, interval: Duration) -> bool {
        let mut monitor = self.monitor.lock();
        if monitor.as_ref().is_some_and(|m| !m.is_finished()) {
            return false;
        }

        let min = Duration::from_millis(1);
        let interval = interval.max(min);
        let health_interval = self.core.config.health_check_interval().max(min);
        *monitor = Some(Monitor::spawn(
            Arc::clone(&self.core),
            interval,
            health_interval,
        ));
        info!(
            interval_ms = interval.as_millis() as u64,
            health_interval_ms = health_interval.as_millis() as u64,
            "queue monitoring started"
        );
        true
    }

    /// [`start_monitoring`](Self::start_monitoring) with the configured interval.
    pub fn start_default_monitoring(&self) -> bool {
        self.start_monitoring(self.core.config.monitor_interval())
    }

    /// Cancel the ticker. Safe to call when monitoring never started.
    pub fn stop_monitoring(&self) -> bool {
        let stopped = self.monitor.lock().take().is_some();
        if stopped {
            info!("queue monitoring stopped");
        }
        stopped
    }

    /// Like [`stop_monitoring`](Self::stop_monitoring) but waits for the
    /// ticker to exit.
    pub async fn shutdown(&self) {
        let monitor = self.monitor.lock().take();
        if let Some(monitor) = monitor {
            monitor.stop().await;
            info!("queue monitoring stopped");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor
            .lock()
            .as_ref()
            .is_some_and(|m| !m.is_finished())
    }

    /// Evaluate health without acting on it.
    pub fn perform_health_check(&self) -> HealthReport {
        self.core.health_check()
    }

    /// Evaluate health and apply the auto-pause rule. This is what each
    /// monitor health tick runs.
    pub fn check_and_remediate(&self) -> HealthReport {
        self.core.check_and_remediate()
    }

    /// Pause dispatch. Returns the snapshot taken right before pausing.
    pub fn emergency_pause(&self, reason: impl Into<String>) -> QueueStats {
        self.core.emergency_pause(reason.into(), false)
    }

    pub fn emergency_resume(&self, reason: impl Into<String>) -> QueueStats {
        let reason = reason.into();
        let before = self.core.queue.stats();
        self.core.queue.resume();
        self.core.record(AuditAction::Resume, reason, false, before.clone(), 0);
        before
    }

    /// Drop all pending tasks. Returns how many were cleared.
    pub fn emergency_clear(&self, reason: impl Into<String>) -> usize {
        let reason = reason.into();
        let before = self.core.queue.stats();
        let cleared = self.core.queue.clear();
        self.core.record(AuditAction::Clear, reason, false, before, cleared);
        cleared
    }

    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.core.audit.lock().entries()
    }

    pub fn detailed_status(&self) -> DetailedStatus {
        self.core.queue.detailed_status()
    }
}

impl Drop for QueueManager {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

impl ManagerCore {
    fn health_check(&self) -> HealthReport {
        let report = evaluate(&self.queue.detailed_status(), &self.config);
        if report.is_healthy {
            info!(health = %report.health, "queue health check passed");
        } else {
            warn!(
                health = %report.health,
                issues = ?report.issues,
                recommendations = ?report.recommendations,
                "queue health check found issues"
            );
        }
        report
    }

    pub(crate) fn check_and_remediate(&self) -> HealthReport {
        let report = self.health_check();
        let queue_length = report.stats.queue_length();

        if report.health == QueueHealth::Critical
            && queue_length > self.config.auto_pause_queue_length
            && !report.is_paused
        {
            let reason = format!(
                "auto-remediation: health critical with queue length {queue_length} above {}",
                self.config.auto_pause_queue_length
            );
            self.emergency_pause(reason, true);
        }
        report
    }

    pub(crate) fn log_status(&self) {
        let status = self.queue.detailed_status();
        let stats = &status.stats;
        info!(
            pending = stats.pending,
            running = stats.running,
            completed = stats.completed,
            failed = stats.failed,
            total_processed = stats.total_processed,
            average_processing_time_ms = stats.average_processing_time_ms,
            health = %stats.queue_health,
            paused = status.is_paused,
            "queue status"
        );
    }

    fn emergency_pause(&self, reason: String, automatic: bool) -> QueueStats {
        let before = self.queue.stats();
        self.queue.pause();
        self.record(AuditAction::Pause, reason, automatic, before.clone(), 0);
        before
    }

    fn record(
        &self,
        action: AuditAction,
        reason: String,
        automatic: bool,
        before: QueueStats,
        affected: usize,
    ) {
        warn!(
            %action,
            reason = %reason,
            automatic,
            affected,
            pending = before.pending,
            running = before.running,
            completed = before.completed,
            failed = before.failed,
            total_processed = before.total_processed,
            average_processing_time_ms = before.average_processing_time_ms,
            health = %before.queue_health,
            "emergency queue action"
        );
        self.audit.lock().push(AuditEntry {
            id: AuditId::generate(),
            at: Utc::now(),
            action,
            reason,
            automatic,
            before,
            affected,
        });
    }
}
