use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::{Priority, TaskId};

/// Categorical tag for a task ("analysis", "report", ...).
///
/// Only used for logs and status output. Scheduling never looks at it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskType {
    fn default() -> Self {
        Self::new("generic")
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Tracing identifier carried through every log line of one logical request.
///
/// Callers usually pass their own (request id, chat turn id, ...). When they
/// don't, one is generated at submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn generate() -> Self {
        Self(format!("corr-{}", Ulid::new()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Per-submission options. Everything is optional; unset fields fall back to
/// queue defaults when the task is admitted.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub task_type: TaskType,
    pub priority: Priority,
    pub timeout: Option<Duration>,
    pub correlation_id: Option<CorrelationId>,
}

impl TaskOptions {
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: TaskType::new(task_type),
            ..Self::default()
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(CorrelationId::new(correlation_id));
        self
    }
}

/// Resolved metadata of an admitted task.
#[derive(Debug, Clone)]
pub struct TaskMeta {
    pub id: TaskId,
    pub correlation_id: CorrelationId,
    pub task_type: TaskType,
    pub priority: Priority,
    pub timeout: Duration,
    pub created_at: DateTime<Utc>,
}

impl TaskMeta {
    pub fn resolve(options: TaskOptions, default_timeout: Duration) -> Self {
        Self {
            id: TaskId::generate(),
            correlation_id: options
                .correlation_id
                .unwrap_or_else(CorrelationId::generate),
            task_type: options.task_type,
            priority: options.priority,
            timeout: options.timeout.unwrap_or(default_timeout),
            created_at: Utc::now(),
        }
    }
}
