//! Queue module: bounded, priority-weighted, concurrency-limited executor.
//!
//! A [`TaskQueue`] accepts async closures, keeps at most `concurrency` of them
//! running, and rejects new work once `pending + running` reaches
//! `max_queue_size`. Each submission gets a [`TaskHandle`] that resolves with
//! the closure's own result, or with a [`QueueError`] describing why the queue
//! gave up on it.

mod record;
mod state;
mod stats;

pub use stats::{DetailedStatus, QueueStats, StatsTracker};

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::QueueConfig;
use crate::domain::{CorrelationId, TaskId, TaskMeta, TaskOptions, TaskState};
use crate::error::QueueError;
use record::{ErasedTask, Settlement, TaskRecord};
use state::QueueState;

/// Handle to a queue instance. Clones share the same queue.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

struct Inner {
    config: QueueConfig,
    state: Mutex<QueueState>,
    idle: Notify,
}

impl TaskQueue {
    /// Create a queue. Zero limits are raised to one, and `concurrency` is
    /// lowered to `max_queue_size` if it exceeds it. The capacity itself is
    /// never raised past what was configured.
    pub fn new(mut config: QueueConfig) -> Self {
        config.max_queue_size = config.max_queue_size.max(1);
        config.concurrency = config.concurrency.clamp(1, config.max_queue_size);
        config.stats_window = config.stats_window.max(1);

        let state = QueueState::new(config.stats_window);
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(state),
                idle: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Admit a task without waiting for it.
    ///
    /// The capacity check happens here, synchronously: on overflow `task_fn`
    /// is dropped without being called. `task_fn` is invoked only when the
    /// task is dispatched. Must be called from within a Tokio runtime.
    pub fn submit<F, Fut, T, E>(
        &self,
        task_fn: F,
        options: TaskOptions,
    ) -> Result<TaskHandle<T, E>, QueueError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let config = &self.inner.config;
        let meta = TaskMeta::resolve(options, config.default_timeout());
        let (reply_tx, reply_rx) = oneshot::channel();
        let handle = TaskHandle {
            id: meta.id,
            correlation_id: meta.correlation_id.clone(),
            reply: reply_rx,
        };

        let mut state = self.inner.state.lock();
        let queue_length = state.queue_length();
        if queue_length >= config.max_queue_size {
            drop(state);
            warn!(
                task_id = %meta.id,
                correlation_id = %meta.correlation_id,
                task_type = %meta.task_type,
                queue_length,
                max_queue_size = config.max_queue_size,
                "queue overflow, rejecting task"
            );
            return Err(QueueError::Overflow {
                queue_length,
                max_queue_size: config.max_queue_size,
            });
        }

        debug!(
            task_id = %meta.id,
            correlation_id = %meta.correlation_id,
            task_type = %meta.task_type,
            priority = %meta.priority,
            queue_length = queue_length + 1,
            "task queued"
        );
        state.admit(Box::new(TaskRecord::new(meta, task_fn, reply_tx)));
        drop(state);

        self.inner.dispatch();
        Ok(handle)
    }

    /// Admit a task and wait for its result.
    pub async fn enqueue<F, Fut, T, E>(
        &self,
        task_fn: F,
        options: TaskOptions,
    ) -> Result<T, QueueError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        self.submit(task_fn, options)?.await
    }

    pub fn stats(&self) -> QueueStats {
        self.inner
            .state
            .lock()
            .snapshot(&self.inner.config.health)
    }

    pub fn detailed_status(&self) -> DetailedStatus {
        let config = &self.inner.config;
        let state = self.inner.state.lock();
        DetailedStatus {
            stats: state.snapshot(&config.health),
            concurrency: config.concurrency,
            max_queue_size: config.max_queue_size,
            default_timeout_ms: config.default_timeout_ms,
            is_paused: state.is_paused(),
        }
    }

    pub fn queue_length(&self) -> usize {
        self.inner.state.lock().queue_length()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().is_paused()
    }

    /// Stop starting new tasks. Running tasks are left alone.
    pub fn pause(&self) {
        if self.inner.state.lock().set_paused(true) {
            info!("queue paused");
        }
    }

    /// Restart dispatch after [`pause`](Self::pause).
    pub fn resume(&self) {
        let changed = self.inner.state.lock().set_paused(false);
        if changed {
            info!("queue resumed");
        }
        self.inner.dispatch();
    }

    /// Discard every pending task. Each one fails with `Cleared` and counts as
    /// failed. Returns how many were discarded.
    pub fn clear(&self) -> usize {
        let (drained, queue_length) = {
            let mut state = self.inner.state.lock();
            let drained = state.drain_pending();
            state.stats.record_failures(drained.len() as u64);
            (drained, state.queue_length())
        };

        let cleared = drained.len();
        for task in drained {
            let meta = task.meta();
            warn!(
                task_id = %meta.id,
                correlation_id = %meta.correlation_id,
                task_type = %meta.task_type,
                queue_length,
                "pending task cleared"
            );
            task.cancel();
        }
        info!(cleared, "queue cleared");

        if queue_length == 0 {
            self.inner.idle.notify_waiters();
        }
        cleared
    }

    /// Zero the completed/failed counters and the duration window.
    pub fn reset_stats(&self) {
        self.inner.state.lock().stats.reset();
        info!("queue statistics reset");
    }

    /// Wait until nothing is pending or running.
    ///
    /// Never returns while the queue is paused with pending work.
    pub async fn idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.queue_length() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Inner {
    /// Start as many pending tasks as free slots allow.
    fn dispatch(self: &Arc<Self>) {
        let ready: Vec<Box<dyn ErasedTask>> = {
            let mut state = self.state.lock();
            std::iter::from_fn(|| state.next_dispatch(self.config.concurrency)).collect()
        };

        for task in ready {
            self.spawn_driver(task);
        }
    }

    fn spawn_driver(self: &Arc<Self>, task: Box<dyn ErasedTask>) {
        let inner = Arc::clone(self);
        let meta = task.meta().clone();
        let span = info_span!(
            "task",
            task_id = %meta.id,
            correlation_id = %meta.correlation_id,
            task_type = %meta.task_type,
            priority = %meta.priority,
        );

        tokio::spawn(
            async move {
                debug!(
                    timeout_ms = meta.timeout.as_millis() as u64,
                    waited_ms = (chrono::Utc::now() - meta.created_at).num_milliseconds(),
                    state = %TaskState::Running,
                    "task started"
                );
                let started = Instant::now();
                let finished = task.run().await;

                inner.settle(&finished.settlement, started.elapsed());
                finished.deliver();
                inner.dispatch();
            }
            .instrument(span),
        );
    }

    /// Fold a finished task into the stats and free its slot.
    fn settle(&self, settlement: &Settlement, elapsed: std::time::Duration) {
        let queue_length = {
            let mut state = self.state.lock();
            state.release_slot();
            match settlement {
                Settlement::Completed => state.stats.record_success(elapsed),
                Settlement::Failed { .. } => state.stats.record_failure(),
            }
            state.queue_length()
        };

        let terminal = settlement.terminal_state();
        debug_assert!(TaskState::Running.can_transition_to(terminal));
        let elapsed_ms = elapsed.as_millis() as u64;
        match settlement {
            Settlement::Completed => {
                debug!(elapsed_ms, state = %terminal, "task completed");
            }
            Settlement::Failed { kind, detail } => {
                warn!(
                    elapsed_ms,
                    state = %terminal,
                    kind = %kind,
                    error = %detail,
                    queue_length,
                    "task failed"
                );
            }
        }

        if queue_length == 0 {
            self.idle.notify_waiters();
        }
    }
}

/// Pending result of a submitted task. Await it to get the outcome.
///
/// Dropping the handle does not cancel the task.
#[derive(Debug)]
#[must_use = "a TaskHandle does nothing unless awaited"]
pub struct TaskHandle<T, E> {
    id: TaskId,
    correlation_id: CorrelationId,
    reply: oneshot::Receiver<Result<T, QueueError<E>>>,
}

impl<T, E> TaskHandle<T, E> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }
}

impl<T, E> Future for TaskHandle<T, E> {
    type Output = Result<T, QueueError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.reply).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // driver went away without replying (runtime shut down mid-task)
            Poll::Ready(Err(_)) => Poll::Ready(Err(QueueError::Panicked { task_id: this.id })),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::oneshot;
    use tokio::time::{Instant, sleep};

    use super::*;
    use crate::domain::{Priority, QueueHealth};
    use crate::error::ErrorKind;

    fn queue(concurrency: usize, max_queue_size: usize) -> TaskQueue {
        TaskQueue::new(QueueConfig {
            concurrency,
            max_queue_size,
            ..QueueConfig::default()
        })
    }

    fn opts() -> TaskOptions {
        TaskOptions::new("test")
    }

    /// Blocks until the returned sender fires (or is dropped).
    fn gate() -> (
        oneshot::Sender<()>,
        impl FnOnce() -> Pin<Box<dyn Future<Output = Result<&'static str, String>> + Send>>,
    ) {
        let (tx, rx) = oneshot::channel::<()>();
        let task = move || -> Pin<Box<dyn Future<Output = Result<&'static str, String>> + Send>> {
            Box::pin(async move {
                let _ = rx.await;
                Ok("gate")
            })
        };
        (tx, task)
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_cap_is_never_exceeded() {
        let q = queue(3, 50);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..12)
            .map(|i| {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                q.submit(
                    move || async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(10 + i * 3)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, String>(i)
                    },
                    opts(),
                )
                .unwrap()
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), i as u64);
        }
        assert_eq!(peak.load(Ordering::SeqCst), 3);

        let stats = q.stats();
        assert_eq!(stats.completed, 12);
        assert_eq!(stats.running, 0);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fifty_first_submission_overflows_and_never_runs() {
        let q = queue(3, 50);
        let mut handles = Vec::new();
        for i in 0..50u32 {
            let handle = q
                .submit(
                    move || async move {
                        sleep(Duration::from_millis(100)).await;
                        Ok::<_, String>(i)
                    },
                    opts(),
                )
                .unwrap();
            handles.push(handle);
        }

        let stats = q.stats();
        assert_eq!(stats.running, 3);
        assert_eq!(stats.pending, 47);

        let invoked = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&invoked);
        let err = q
            .submit(
                move || async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok::<u32, String>(0)
                },
                opts(),
            )
            .err()
            .expect("51st submission must overflow");

        assert!(matches!(
            err,
            QueueError::Overflow {
                queue_length: 50,
                max_queue_size: 50
            }
        ));
        // rejection has no side effects on the counters
        assert_eq!(q.stats(), stats);

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), i as u32);
        }
        assert!(!invoked.load(Ordering::SeqCst));
        assert_eq!(q.stats().completed, 50);
        assert_eq!(q.stats().failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_overflow_is_immediate() {
        let q = queue(1, 1);
        let (release, blocker) = gate();
        let running = q.submit(blocker, opts()).unwrap();

        let err = q
            .enqueue(|| async { Ok::<(), String>(()) }, opts())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Overflow);

        release.send(()).unwrap();
        assert_eq!(running.await.unwrap(), "gate");
    }

    #[tokio::test(start_paused = true)]
    async fn higher_priority_dispatches_first_and_ties_are_fifo() {
        let q = queue(1, 50);
        let started = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (release, blocker) = gate();
        let first = q.submit(blocker, opts()).unwrap();

        let mut handles = Vec::new();
        for (name, priority) in [
            ("normal-1", Priority::Normal),
            ("low", Priority::Low),
            ("normal-2", Priority::Normal),
            ("high", Priority::High),
        ] {
            let started = Arc::clone(&started);
            let handle = q
                .submit(
                    move || async move {
                        started.lock().push(name);
                        Ok::<_, String>(())
                    },
                    opts().priority(priority),
                )
                .unwrap();
            handles.push(handle);
        }

        release.send(()).unwrap();
        first.await.unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*started.lock(), ["high", "normal-1", "normal-2", "low"]);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_rejects_caller_and_counts_once() {
        let q = queue(3, 50);
        let err = q
            .enqueue(
                || async {
                    sleep(Duration::from_secs(10)).await;
                    Ok::<(), String>(())
                },
                opts().timeout(Duration::from_millis(100)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::Timeout { timeout, .. } if timeout == Duration::from_millis(100)));

        // let the aborted task's leftovers (if any) run
        sleep(Duration::from_secs(20)).await;
        let stats = q.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.running, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_task_frees_its_slot() {
        let q = queue(1, 50);
        let slow = q
            .submit(
                || async {
                    sleep(Duration::from_secs(60)).await;
                    Ok::<u8, String>(1)
                },
                opts().timeout(Duration::from_millis(50)),
            )
            .unwrap();
        let next = q
            .submit(|| async { Ok::<u8, String>(2) }, opts())
            .unwrap();

        assert_eq!(slow.await.unwrap_err().kind(), ErrorKind::Timeout);
        assert_eq!(next.await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn default_timeout_comes_from_config() {
        let q = TaskQueue::new(QueueConfig {
            default_timeout_ms: 250,
            ..QueueConfig::default()
        });
        let err = q
            .enqueue(
                || async {
                    sleep(Duration::from_secs(1)).await;
                    Ok::<(), String>(())
                },
                opts(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Timeout { timeout, .. } if timeout == Duration::from_millis(250)));
    }

    #[tokio::test(start_paused = true)]
    async fn average_tracks_latest_hundred_completions() {
        let q = queue(1, 200);
        let handles: Vec<_> = (1..=150u64)
            .map(|ms| {
                q.submit(
                    move || async move {
                        sleep(Duration::from_millis(ms)).await;
                        Ok::<_, String>(())
                    },
                    opts(),
                )
                .unwrap()
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // mean(51..=150) = 100.5; the mean of all 150 would be 75.5
        let avg = q.stats().average_processing_time_ms;
        assert!((avg - 100.5).abs() < 1.5, "average was {avg}");
    }

    #[tokio::test(start_paused = true)]
    async fn task_errors_pass_through_and_drive_health() {
        let q = queue(3, 50);
        let handles: Vec<_> = (0..10)
            .map(|i| {
                q.submit(
                    move || async move {
                        if i < 6 {
                            Err(format!("upstream error {i}"))
                        } else {
                            Ok(i)
                        }
                    },
                    opts(),
                )
                .unwrap()
            })
            .collect();

        let mut errors = Vec::new();
        for handle in handles {
            if let Err(err) = handle.await {
                errors.push(err.into_task_error().unwrap());
            }
        }
        errors.sort();
        assert_eq!(errors.len(), 6);
        assert_eq!(errors[0], "upstream error 0");

        let stats = q.stats();
        assert_eq!(stats.total_processed, 10);
        assert_eq!(stats.failed, 6);
        assert_eq!(stats.queue_health, QueueHealth::Critical);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_holds_new_work_and_resume_releases_it() {
        let q = queue(3, 50);
        let (release, blocker) = gate();
        let in_flight = q.submit(blocker, opts()).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(q.stats().running, 1);

        q.pause();
        q.pause();
        assert!(q.is_paused());

        let ran = Arc::new(AtomicUsize::new(0));
        let held: Vec<_> = (0..3)
            .map(|_| {
                let ran = Arc::clone(&ran);
                q.submit(
                    move || async move {
                        ran.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, String>(())
                    },
                    opts(),
                )
                .unwrap()
            })
            .collect();

        // the in-flight task still settles while paused
        release.send(()).unwrap();
        assert_eq!(in_flight.await.unwrap(), "gate");
        sleep(Duration::from_secs(1)).await;

        let stats = q.stats();
        assert_eq!(stats.running, 0);
        assert_eq!(stats.pending, 3);
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        q.resume();
        q.resume();
        for handle in held {
            handle.await.unwrap();
        }
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert!(!q.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_rejects_pending_only() {
        let q = queue(1, 50);
        let (release, blocker) = gate();
        let running = q.submit(blocker, opts()).unwrap();

        let invoked = Arc::new(AtomicUsize::new(0));
        let pending: Vec<_> = (0..4)
            .map(|_| {
                let invoked = Arc::clone(&invoked);
                q.submit(
                    move || async move {
                        invoked.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, String>(())
                    },
                    opts(),
                )
                .unwrap()
            })
            .collect();

        assert_eq!(q.clear(), 4);
        for handle in pending {
            assert!(matches!(handle.await, Err(QueueError::Cleared { .. })));
        }

        let stats = q.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.failed, 4);

        release.send(()).unwrap();
        assert_eq!(running.await.unwrap(), "gate");
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(q.stats().completed, 1);
        assert_eq!(q.clear(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn five_tasks_run_in_two_waves() {
        let q = queue(3, 50);
        let start = Instant::now();
        let handles: Vec<_> = (0..5)
            .map(|i| {
                q.submit(
                    move || async move {
                        sleep(Duration::from_millis(100)).await;
                        Ok::<_, String>(i)
                    },
                    opts(),
                )
                .unwrap()
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(250), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_task_does_not_leak_a_slot() {
        let q = queue(1, 50);
        let bad = q
            .submit(
                || async {
                    if true {
                        panic!("bug in handler");
                    }
                    Ok::<u8, String>(0)
                },
                opts(),
            )
            .unwrap();
        let good = q.submit(|| async { Ok::<u8, String>(9) }, opts()).unwrap();

        assert_eq!(bad.await.unwrap_err().kind(), ErrorKind::Panicked);
        assert_eq!(good.await.unwrap(), 9);

        let stats = q.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn handle_exposes_ids() {
        let q = queue(3, 50);
        let handle = q
            .submit(
                || async { Ok::<_, String>(()) },
                opts().correlation_id("req-7"),
            )
            .unwrap();

        assert!(handle.id().to_string().starts_with("task-"));
        assert_eq!(handle.correlation_id().as_str(), "req-7");
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn idle_waits_for_drain() {
        let q = queue(2, 50);
        q.idle().await;

        for ms in [50u64, 80, 120] {
            let _ = q.submit(
                move || async move {
                    sleep(Duration::from_millis(ms)).await;
                    Ok::<_, String>(())
                },
                opts(),
            );
        }
        q.idle().await;
        assert_eq!(q.queue_length(), 0);
        assert_eq!(q.stats().completed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn detailed_status_and_reset() {
        let q = TaskQueue::new(QueueConfig {
            concurrency: 2,
            max_queue_size: 10,
            default_timeout_ms: 5_000,
            ..QueueConfig::default()
        });
        q.enqueue(|| async { Ok::<_, String>(()) }, opts())
            .await
            .unwrap();
        q.pause();

        let status = q.detailed_status();
        assert_eq!(status.concurrency, 2);
        assert_eq!(status.max_queue_size, 10);
        assert_eq!(status.default_timeout_ms, 5_000);
        assert!(status.is_paused);
        assert_eq!(status.stats.completed, 1);

        q.reset_stats();
        let stats = q.stats();
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.total_processed, 0);
        assert_eq!(stats.average_processing_time_ms, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn queues_are_isolated_and_clones_share() {
        let a = queue(3, 50);
        let b = queue(3, 50);
        let a2 = a.clone();

        a2.enqueue(|| async { Ok::<_, String>(()) }, opts())
            .await
            .unwrap();

        assert_eq!(a.stats().completed, 1);
        assert_eq!(b.stats().completed, 0);
    }

    #[test]
    fn zero_limits_are_raised() {
        let q = TaskQueue::new(QueueConfig {
            concurrency: 0,
            max_queue_size: 0,
            stats_window: 0,
            ..QueueConfig::default()
        });
        assert_eq!(q.config().concurrency, 1);
        assert_eq!(q.config().max_queue_size, 1);
        assert_eq!(q.config().stats_window, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_above_capacity_keeps_the_capacity() {
        let q = queue(5, 3);
        assert_eq!(q.config().max_queue_size, 3);
        assert_eq!(q.config().concurrency, 3);

        let (gates, tasks): (Vec<_>, Vec<_>) = (0..3).map(|_| gate()).unzip();
        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| q.submit(task, opts()).unwrap())
            .collect();

        let err = q
            .submit(|| async { Ok::<_, String>("late") }, opts())
            .unwrap_err();
        assert!(matches!(
            err,
            QueueError::Overflow {
                queue_length: 3,
                max_queue_size: 3
            }
        ));

        for gate in gates {
            let _ = gate.send(());
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), "gate");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn parallel_callers_share_the_cap() {
        let q = queue(3, 50);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let callers: Vec<_> = (0..16)
            .map(|caller| {
                let q = q.clone();
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let mut ok = 0;
                    for i in 0..20u64 {
                        let current = Arc::clone(&current);
                        let peak = Arc::clone(&peak);
                        let result = q
                            .enqueue(
                                move || async move {
                                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                                    peak.fetch_max(now, Ordering::SeqCst);
                                    sleep(Duration::from_micros(200 + (caller * 7 + i) % 300)).await;
                                    current.fetch_sub(1, Ordering::SeqCst);
                                    Ok::<_, String>(i)
                                },
                                opts(),
                            )
                            .await;
                        if result.is_ok() {
                            ok += 1;
                        }
                    }
                    ok
                })
            })
            .collect();

        let mut succeeded = 0u64;
        for caller in callers {
            succeeded += caller.await.unwrap();
        }
        q.idle().await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        // 16 callers never have more than 16 tasks queued, well under 50
        assert_eq!(succeeded, 320);
        let stats = q.stats();
        assert_eq!(stats.completed, succeeded);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.running, 0);
    }
}
