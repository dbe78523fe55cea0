//! Inference adapter: routes calls to an [`InferenceClient`] through a
//! [`TaskQueue`] so the upstream never sees more than `concurrency` requests.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Priority, TaskOptions, TaskType};
use crate::error::QueueError;
use crate::queue::{TaskHandle, TaskQueue};

/// What kind of work a request is. Fixes its task type and default priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Analysis,
    Report,
    Interactive,
}

impl RequestKind {
    pub fn task_type(self) -> TaskType {
        TaskType::new(self.as_str())
    }

    pub fn default_priority(self) -> Priority {
        match self {
            RequestKind::Analysis => Priority::Normal,
            RequestKind::Report => Priority::Low,
            RequestKind::Interactive => Priority::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Analysis => "analysis",
            RequestKind::Report => "report",
            RequestKind::Interactive => "interactive",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub kind: RequestKind,
    pub prompt: String,
    /// Overrides the kind's default priority.
    pub priority: Option<Priority>,
    pub correlation_id: Option<String>,
    /// Overrides the queue's default timeout.
    pub timeout: Option<Duration>,
}

impl InferenceRequest {
    pub fn new(kind: RequestKind, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            prompt: prompt.into(),
            priority: None,
            correlation_id: None,
            timeout: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn task_options(&self) -> TaskOptions {
        let mut options = TaskOptions::new(self.kind.as_str())
            .priority(self.priority.unwrap_or(self.kind.default_priority()));
        if let Some(timeout) = self.timeout {
            options = options.timeout(timeout);
        }
        if let Some(id) = &self.correlation_id {
            options = options.correlation_id(id.clone());
        }
        options
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub text: String,
    pub model: String,
    pub tokens_used: u32,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// The upstream inference call. Implementations must be cheap to share.
#[async_trait]
pub trait InferenceClient: Send + Sync + 'static {
    async fn complete(
        &self,
        request: InferenceRequest,
    ) -> Result<InferenceResponse, InferenceError>;
}

/// An [`InferenceClient`] whose calls go through a queue.
pub struct QueuedInference<C> {
    client: Arc<C>,
    queue: TaskQueue,
}

impl<C> Clone for QueuedInference<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            queue: self.queue.clone(),
        }
    }
}

impl<C: InferenceClient> QueuedInference<C> {
    pub fn new(client: C, queue: TaskQueue) -> Self {
        Self::from_arc(Arc::new(client), queue)
    }

    pub fn from_arc(client: Arc<C>, queue: TaskQueue) -> Self {
        Self { client, queue }
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Queue a request without waiting. Overflow is reported immediately.
    pub fn submit(
        &self,
        request: InferenceRequest,
    ) -> Result<TaskHandle<InferenceResponse, InferenceError>, QueueError<InferenceError>> {
        let options = request.task_options();
        let client = Arc::clone(&self.client);
        self.queue
            .submit(move || async move { client.complete(request).await }, options)
    }

    /// Queue a request and wait for the upstream's answer.
    pub async fn request(
        &self,
        request: InferenceRequest,
    ) -> Result<InferenceResponse, QueueError<InferenceError>> {
        self.submit(request)?.await
    }
}
