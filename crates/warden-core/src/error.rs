use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::TaskId;

/// Error returned to a caller of `TaskQueue::submit` / `enqueue`.
///
/// `E` is the error type of the wrapped operation. It is handed back unchanged
/// in [`QueueError::Task`].
#[derive(Debug, Error)]
pub enum QueueError<E> {
    #[error("queue is full ({queue_length}/{max_queue_size}); retry later")]
    Overflow {
        queue_length: usize,
        max_queue_size: usize,
    },

    #[error("task {task_id} timed out after {timeout:?}")]
    Timeout { task_id: TaskId, timeout: Duration },

    #[error("task {task_id} was cleared before it could run")]
    Cleared { task_id: TaskId },

    #[error("task {task_id} panicked")]
    Panicked { task_id: TaskId },

    #[error("task failed: {0}")]
    Task(#[source] E),
}

impl<E> QueueError<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueueError::Overflow { .. } => ErrorKind::Overflow,
            QueueError::Timeout { .. } => ErrorKind::Timeout,
            QueueError::Cleared { .. } => ErrorKind::Cleared,
            QueueError::Panicked { .. } => ErrorKind::Panicked,
            QueueError::Task(_) => ErrorKind::Task,
        }
    }

    /// The wrapped operation's own error, if that is what failed.
    pub fn into_task_error(self) -> Option<E> {
        match self {
            QueueError::Task(e) => Some(e),
            _ => None,
        }
    }

    /// Queue-originated errors (everything except the operation's own error).
    pub fn is_queue_error(&self) -> bool {
        !matches!(self, QueueError::Task(_))
    }
}

/// Classification of a failed task, used in logs and state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected at submission; the task never entered the queue.
    Overflow,
    Timeout,
    /// Discarded by an administrative clear while still pending.
    Cleared,
    Panicked,
    /// The wrapped operation returned an error.
    Task,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Overflow => "overflow",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cleared => "cleared",
            ErrorKind::Panicked => "panicked",
            ErrorKind::Task => "task",
        };
        f.write_str(s)
    }
}
