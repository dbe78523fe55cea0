//! Configuration for the queue and its manager.
//!
//! Every value has a default, so an empty file (or no file) is a valid
//! configuration. Loading order: defaults, then the TOML file if one is given,
//! then `WARDEN_*` environment variables. The result is validated before it is
//! returned.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::HealthThresholds;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Limits of one `TaskQueue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of tasks running at once.
    pub concurrency: usize,
    /// Maximum of pending + running. Submissions beyond it overflow.
    pub max_queue_size: usize,
    /// Timeout applied when a submission does not set one.
    pub default_timeout_ms: u64,
    /// Number of recent durations kept for the rolling average.
    pub stats_window: usize,
    pub health: HealthThresholds,
}

impl QueueConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_queue_size: 50,
            default_timeout_ms: 120_000,
            stats_window: 100,
            health: HealthThresholds::default(),
        }
    }
}

/// Monitoring and health-check settings of a `QueueManager`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Status snapshot interval used by `start_default_monitoring`.
    pub monitor_interval_ms: u64,
    /// Health check (and auto-remediation) interval while monitoring.
    pub health_check_interval_ms: u64,
    /// Queue length above which a critical queue is paused automatically.
    pub auto_pause_queue_length: usize,
    pub queue_length_warning: usize,
    pub queue_length_critical: usize,
    pub processing_time_warning_ms: f64,
    pub processing_time_critical_ms: f64,
    pub failure_rate_warning: f64,
    /// Number of audit entries kept in memory.
    pub audit_capacity: usize,
}

impl ManagerConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            monitor_interval_ms: 60_000,
            health_check_interval_ms: 30_000,
            auto_pause_queue_length: 45,
            queue_length_warning: 20,
            queue_length_critical: 40,
            processing_time_warning_ms: 60_000.0,
            processing_time_critical_ms: 120_000.0,
            failure_rate_warning: 0.3,
            audit_capacity: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub queue: QueueConfig,
    pub manager: ManagerConfig,
}

impl WardenConfig {
    /// Load from an optional TOML file plus the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, std::env::vars())
    }

    /// [`load`](Self::load) with the environment supplied by the caller.
    pub fn load_with_env<I>(path: Option<&Path>, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                debug!(path = %path.display(), "loading config file");
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(vars)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `WARDEN_*` overrides from `vars`. Unknown keys are ignored.
    pub fn apply_env_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "WARDEN_CONCURRENCY" => self.queue.concurrency = parse_env(&key, &value)?,
                "WARDEN_MAX_QUEUE_SIZE" => self.queue.max_queue_size = parse_env(&key, &value)?,
                "WARDEN_DEFAULT_TIMEOUT_MS" => {
                    self.queue.default_timeout_ms = parse_env(&key, &value)?
                }
                "WARDEN_STATS_WINDOW" => self.queue.stats_window = parse_env(&key, &value)?,
                "WARDEN_MONITOR_INTERVAL_MS" => {
                    self.manager.monitor_interval_ms = parse_env(&key, &value)?
                }
                "WARDEN_HEALTH_CHECK_INTERVAL_MS" => {
                    self.manager.health_check_interval_ms = parse_env(&key, &value)?
                }
                "WARDEN_AUTO_PAUSE_QUEUE_LENGTH" => {
                    self.manager.auto_pause_queue_length = parse_env(&key, &value)?
                }
                _ => continue,
            }
            debug!(%key, %value, "config overridden from environment");
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let q = &self.queue;
        let m = &self.manager;

        if q.concurrency == 0 {
            return invalid("queue.concurrency must be at least 1");
        }
        if q.max_queue_size == 0 {
            return invalid("queue.max_queue_size must be at least 1");
        }
        if q.concurrency > q.max_queue_size {
            return invalid("queue.concurrency must not exceed queue.max_queue_size");
        }
        if q.default_timeout_ms == 0 {
            return invalid("queue.default_timeout_ms must be positive");
        }
        if q.stats_window == 0 {
            return invalid("queue.stats_window must be at least 1");
        }
        for (name, rate) in [
            ("queue.health.critical_failure_rate", q.health.critical_failure_rate),
            ("queue.health.degraded_failure_rate", q.health.degraded_failure_rate),
            ("manager.failure_rate_warning", m.failure_rate_warning),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return invalid(&format!("{name} must be within [0, 1]"));
            }
        }
        if m.monitor_interval_ms == 0 || m.health_check_interval_ms == 0 {
            return invalid("manager intervals must be positive");
        }
        if m.auto_pause_queue_length > q.max_queue_size {
            return invalid("manager.auto_pause_queue_length must not exceed queue.max_queue_size");
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn invalid(msg: &str) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(msg.to_string()))
}
