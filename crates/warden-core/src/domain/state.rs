//! Task state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Task state.
///
/// State transitions:
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Failed(Timeout | Task | Panicked)
/// - Pending -> Failed(Cleared)
///
/// `Failed(Overflow)` is never entered by an admitted task; it describes a
/// submission that was rejected before it got a state at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Admitted, waiting for a free slot.
    Pending,

    /// Holding a concurrency slot.
    Running,

    /// Task future resolved with `Ok`.
    Completed,

    Failed(ErrorKind),
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed(_))
    }

    /// Checks a transition against the machine above.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        match (self, next) {
            (TaskState::Pending, TaskState::Running) => true,
            (TaskState::Pending, TaskState::Failed(ErrorKind::Cleared)) => true,
            (TaskState::Running, TaskState::Completed) => true,
            (TaskState::Running, TaskState::Failed(kind)) => matches!(
                kind,
                ErrorKind::Timeout | ErrorKind::Task | ErrorKind::Panicked
            ),
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => f.write_str("pending"),
            TaskState::Running => f.write_str("running"),
            TaskState::Completed => f.write_str("completed"),
            TaskState::Failed(kind) => write!(f, "failed({kind})"),
        }
    }
}
