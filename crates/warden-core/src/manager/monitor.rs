//! Background ticker owned by the manager.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::debug;

use super::ManagerCore;

/// Running monitor.
/// - `stop()` or drop ends the loop; drop also aborts the task so a ticker never
///   outlives its manager.
pub(crate) struct Monitor {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl Monitor {
    pub(crate) fn spawn(
        core: Arc<ManagerCore>,
        status_interval: Duration,
        health_interval: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(monitor_loop(
            core,
            status_interval,
            health_interval,
            shutdown_rx,
        ));
        Self { shutdown_tx, join }
    }

    /// Request shutdown and wait for the loop to exit.
    pub(crate) async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        let _ = (&mut self.join).await;
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
        self.join.abort();
    }
}

async fn monitor_loop(
    core: Arc<ManagerCore>,
    status_interval: Duration,
    health_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let start = Instant::now();
    let mut status_tick = interval_at(start + status_interval, status_interval);
    let mut health_tick = interval_at(start + health_interval, health_interval);
    status_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    health_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(
        status_interval_ms = status_interval.as_millis() as u64,
        health_interval_ms = health_interval.as_millis() as u64,
        "queue monitor started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = status_tick.tick() => core.log_status(),
            _ = health_tick.tick() => {
                core.check_and_remediate();
            }
        }
    }

    debug!("queue monitor stopped");
}
