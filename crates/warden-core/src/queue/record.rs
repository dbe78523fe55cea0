//! Task record: metadata + the caller's closure + the reply channel.

use std::fmt::Display;
use std::future::Future;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::Instrument;

use crate::domain::{TaskMeta, TaskState};
use crate::error::{ErrorKind, QueueError};

/// How a dispatched task ended, as far as the queue's bookkeeping cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Settlement {
    Completed,
    Failed { kind: ErrorKind, detail: String },
}

impl Settlement {
    pub(crate) fn terminal_state(&self) -> TaskState {
        match self {
            Settlement::Completed => TaskState::Completed,
            Settlement::Failed { kind, .. } => TaskState::Failed(*kind),
        }
    }
}

/// Result of running a record. The reply is held back until the queue has
/// folded the settlement into its stats, so a caller that wakes up on the
/// reply always observes counters that include its own task.
pub(crate) struct Finished {
    pub(crate) settlement: Settlement,
    deliver: Box<dyn FnOnce() + Send>,
}

impl Finished {
    pub(crate) fn deliver(self) {
        (self.deliver)()
    }
}

/// Type-erased view of a [`TaskRecord`], so one heap can hold tasks with
/// different output and error types.
#[async_trait]
pub(crate) trait ErasedTask: Send {
    fn meta(&self) -> &TaskMeta;

    /// Invoke the closure and drive it to completion, timeout, or panic.
    async fn run(self: Box<Self>) -> Finished;

    /// Fail a task that was discarded before it ran.
    fn cancel(self: Box<Self>);
}

pub(crate) struct TaskRecord<F, T, E> {
    meta: TaskMeta,
    task_fn: F,
    reply: oneshot::Sender<Result<T, QueueError<E>>>,
}

impl<F, T, E> TaskRecord<F, T, E> {
    pub(crate) fn new(
        meta: TaskMeta,
        task_fn: F,
        reply: oneshot::Sender<Result<T, QueueError<E>>>,
    ) -> Self {
        Self {
            meta,
            task_fn,
            reply,
        }
    }
}

#[async_trait]
impl<F, Fut, T, E> ErasedTask for TaskRecord<F, T, E>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    async fn run(self: Box<Self>) -> Finished {
        let TaskRecord {
            meta,
            task_fn,
            reply,
        } = *self;

        // Own task so a panic surfaces as a JoinError instead of killing the
        // driver, and so a timeout can abort it.
        let mut handle = tokio::spawn(task_fn().instrument(tracing::Span::current()));

        let (result, settlement) = match tokio::time::timeout(meta.timeout, &mut handle).await {
            Ok(Ok(Ok(value))) => (Ok(value), Settlement::Completed),
            Ok(Ok(Err(err))) => {
                let detail = err.to_string();
                (
                    Err(QueueError::Task(err)),
                    Settlement::Failed {
                        kind: ErrorKind::Task,
                        detail,
                    },
                )
            }
            Ok(Err(join_err)) => {
                let detail = if join_err.is_panic() {
                    "task panicked".to_string()
                } else {
                    "task was cancelled".to_string()
                };
                (
                    Err(QueueError::Panicked { task_id: meta.id }),
                    Settlement::Failed {
                        kind: ErrorKind::Panicked,
                        detail,
                    },
                )
            }
            Err(_elapsed) => {
                handle.abort();
                (
                    Err(QueueError::Timeout {
                        task_id: meta.id,
                        timeout: meta.timeout,
                    }),
                    Settlement::Failed {
                        kind: ErrorKind::Timeout,
                        detail: format!("exceeded {:?}", meta.timeout),
                    },
                )
            }
        };

        Finished {
            settlement,
            deliver: Box::new(move || {
                // the caller may have dropped its handle
                let _ = reply.send(result);
            }),
        }
    }

    fn cancel(self: Box<Self>) {
        let task_id = self.meta.id;
        let _ = self.reply.send(Err(QueueError::Cleared { task_id }));
    }
}
