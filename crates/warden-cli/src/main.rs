use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use warden_core::adapter::{InferenceError, InferenceResponse};
use warden_core::observability::init_tracing;
use warden_core::{
    ConfigError, DetailedStatus, HealthReport, InferenceClient, InferenceRequest, QueueManager,
    QueuedInference, RequestKind, TaskQueue, WardenConfig,
};

/// Drive a simulated inference backend through the scheduler.
#[derive(Debug, Parser)]
#[command(name = "warden", version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Requests to submit in one burst
    #[arg(short = 'n', long, default_value_t = 20)]
    requests: usize,

    /// Fraction of simulated calls that fail
    #[arg(long, default_value_t = 0.1)]
    failure_rate: f64,

    /// Mean simulated latency
    #[arg(long, default_value_t = 300)]
    latency_ms: u64,

    /// Status log interval; defaults to the configured monitor interval
    #[arg(long)]
    monitor_interval_ms: Option<u64>,

    /// Default tracing directive when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failure rate must be within [0, 1], got {0}")]
    FailureRate(f64),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fake upstream with jittered latency and random failures.
struct SimulatedClient {
    latency: Duration,
    failure_rate: f64,
}

#[async_trait]
impl InferenceClient for SimulatedClient {
    async fn complete(
        &self,
        request: InferenceRequest,
    ) -> Result<InferenceResponse, InferenceError> {
        // ThreadRng is !Send; keep it out of the await
        let (delay, fail) = {
            let mut rng = rand::thread_rng();
            let jitter = rng.gen_range(0.5..1.5);
            (
                self.latency.mul_f64(jitter),
                rng.gen_bool(self.failure_rate),
            )
        };
        sleep(delay).await;

        if fail {
            return Err(InferenceError::Unavailable("simulated 503".to_string()));
        }
        Ok(InferenceResponse {
            text: format!("[{}] {}", request.kind, request.prompt),
            model: "simulated".to_string(),
            tokens_used: request.prompt.split_whitespace().count() as u32,
        })
    }
}

#[derive(Serialize)]
struct Summary {
    succeeded: usize,
    failed: usize,
    rejected: usize,
    status: DetailedStatus,
    health: HealthReport,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let args = Args::parse();
    init_tracing(&args.log);

    if !(0.0..=1.0).contains(&args.failure_rate) {
        return Err(CliError::FailureRate(args.failure_rate));
    }

    let config = WardenConfig::load(args.config.as_deref())?;
    info!(
        concurrency = config.queue.concurrency,
        max_queue_size = config.queue.max_queue_size,
        "configuration loaded"
    );

    let queue = TaskQueue::new(config.queue.clone());
    let manager = QueueManager::new(queue.clone(), config.manager.clone());
    match args.monitor_interval_ms {
        Some(ms) => manager.start_monitoring(Duration::from_millis(ms)),
        None => manager.start_default_monitoring(),
    };

    let client = SimulatedClient {
        latency: Duration::from_millis(args.latency_ms),
        failure_rate: args.failure_rate,
    };
    let inference = QueuedInference::new(client, queue.clone());

    let kinds = [
        RequestKind::Analysis,
        RequestKind::Report,
        RequestKind::Interactive,
    ];
    let mut rejected = 0;
    let mut handles = Vec::with_capacity(args.requests);
    for i in 0..args.requests {
        let kind = kinds[i % kinds.len()];
        let request = InferenceRequest::new(kind, format!("request number {i}"))
            .correlation_id(format!("cli-{i}"));
        match inference.submit(request) {
            Ok(handle) => handles.push(tokio::spawn(handle)),
            Err(e) => {
                rejected += 1;
                warn!(request = i, error = %e, "request rejected");
            }
        }
    }

    tokio::select! {
        _ = queue.idle() => {}
        _ = tokio::signal::ctrl_c() => {
            let cleared = manager.emergency_clear("interrupted by operator");
            warn!(cleared, "interrupted, waiting for running requests");
            queue.idle().await;
        }
    }

    let (mut succeeded, mut failed) = (0, 0);
    for handle in handles {
        match handle.await {
            Ok(Ok(_)) => succeeded += 1,
            _ => failed += 1,
        }
    }

    manager.shutdown().await;
    let summary = Summary {
        succeeded,
        failed,
        rejected,
        status: manager.detailed_status(),
        health: manager.perform_health_check(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
