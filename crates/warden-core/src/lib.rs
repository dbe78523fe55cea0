//! warden-core
//!
//! Bounded-concurrency scheduler for calls to a slow, rate-limited upstream
//! (an AI inference API).
//!
//! - **queue**: [`TaskQueue`], a priority-weighted executor with a hard
//!   concurrency ceiling, per-task timeouts, overflow rejection and rolling stats
//! - **domain**: ids, priorities, task metadata, task states, health classifier
//! - **manager**: [`QueueManager`], periodic monitoring, health reports,
//!   auto-pause and audited emergency controls
//! - **adapter**: [`QueuedInference`], routes an [`InferenceClient`] through a queue
//! - **config**: [`WardenConfig`], TOML file plus `WARDEN_*` overrides
//! - **observability**: tracing subscriber setup

pub mod adapter;
pub mod config;
pub mod domain;
pub mod error;
pub mod manager;
pub mod observability;
pub mod queue;

pub use adapter::{InferenceClient, InferenceRequest, QueuedInference, RequestKind};
pub use config::{ConfigError, ManagerConfig, QueueConfig, WardenConfig};
pub use domain::{Priority, QueueHealth, TaskOptions};
pub use error::{ErrorKind, QueueError};
pub use manager::{HealthReport, QueueManager};
pub use queue::{DetailedStatus, QueueStats, TaskHandle, TaskQueue};
