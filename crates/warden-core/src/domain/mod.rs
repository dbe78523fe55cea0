//! Domain model (ids, task metadata, priorities, state, health).

pub mod health;
pub mod ids;
pub mod priority;
pub mod state;
pub mod task;

pub use health::{HealthThresholds, QueueHealth, classify};
pub use ids::{AuditId, TaskId};
pub use priority::Priority;
pub use state::TaskState;
pub use task::{CorrelationId, TaskMeta, TaskOptions, TaskType};
