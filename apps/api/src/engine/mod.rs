//! Durable workflow engine.
//!
//! Workflow runs are records in the keyed store; starting a run writes its
//! record and pushes its id onto a task queue, and a `Worker` on that queue
//! executes it and writes the terminal state back. The API process never holds
//! run state of its own: the store is the single source of truth for "is it
//! done yet".
//!
//! Model calls inside a workflow go through `WorkflowContext::execute_activity`,
//! which applies the start-to-close timeout and retry policy from
//! `ActivityOptions`.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

pub mod client;
pub mod retry;
pub mod worker;

pub use client::{WorkflowClient, WorkflowDescription, WorkflowHandle};
pub use retry::{ActivityError, ActivityOptions, RetryPolicy};
pub use worker::{Worker, WorkerOptions, DEFAULT_PURGE_INTERVAL};

/// Lifecycle state of a workflow run, named the way engines report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    Canceled,
    Terminated,
    TimedOut,
}

impl WorkflowStatus {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowStatus::Running => "RUNNING",
            WorkflowStatus::Completed => "COMPLETED",
            WorkflowStatus::Failed => "FAILED",
            WorkflowStatus::Canceled => "CANCELED",
            WorkflowStatus::Terminated => "TERMINATED",
            WorkflowStatus::TimedOut => "TIMED_OUT",
        }
    }

    pub fn is_closed(&self) -> bool {
        !matches!(self, WorkflowStatus::Running)
    }
}

/// Persisted state of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub workflow_id: String,
    pub run_id: Uuid,
    pub workflow_type: String,
    pub task_queue: String,
    pub status: WorkflowStatus,
    pub input: Value,
    pub output: Option<Value>,
    pub failure: Option<String>,
    /// Activity attempts made by the run, retries included.
    pub activity_attempts: u32,
    pub started_at: DateTime<Utc>,
    pub execution_deadline: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl WorkflowRecord {
    /// The status callers should see at `now`. A run still marked running
    /// after its deadline is reported as timed out, which covers a worker
    /// that died mid-run.
    pub fn effective_status(&self, now: DateTime<Utc>) -> WorkflowStatus {
        if self.status == WorkflowStatus::Running && now > self.execution_deadline {
            WorkflowStatus::TimedOut
        } else {
            self.status
        }
    }

    pub(crate) fn close(
        &mut self,
        status: WorkflowStatus,
        output: Option<Value>,
        failure: Option<String>,
    ) {
        self.status = status;
        self.output = output;
        self.failure = failure;
        self.closed_at = Some(Utc::now());
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow {0} not found")]
    NotFound(String),

    #[error("workflow {0} already started")]
    AlreadyStarted(String),

    #[error("engine unavailable: {0}")]
    Unavailable(#[from] StoreError),

    #[error("result of workflow {workflow_id} unavailable: {reason}")]
    ResultUnavailable { workflow_id: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid workflow input: {0}")]
    InvalidInput(#[source] serde_json::Error),

    #[error("activity failed: {0}")]
    Activity(#[from] ActivityError),

    #[error("{0}")]
    Failed(String),
}

/// A named, replay-free durable procedure from JSON input to JSON output.
#[async_trait]
pub trait Workflow: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &WorkflowContext, input: Value) -> Result<Value, WorkflowError>;
}

/// Per-run handle given to a workflow while it executes.
pub struct WorkflowContext {
    workflow_id: String,
    run_id: Uuid,
    activity_options: ActivityOptions,
    activity_attempts: AtomicU32,
}

impl WorkflowContext {
    pub fn new(workflow_id: impl Into<String>, run_id: Uuid, activity_options: ActivityOptions) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id,
            activity_options,
            activity_attempts: AtomicU32::new(0),
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn activity_attempts(&self) -> u32 {
        self.activity_attempts.load(Ordering::Relaxed)
    }

    /// Executes one activity under this run's timeout and retry policy.
    pub async fn execute_activity<T, F, Fut>(
        &self,
        name: &str,
        mut attempt_fn: F,
    ) -> Result<T, ActivityError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ActivityError>>,
    {
        let attempts = &self.activity_attempts;
        retry::run_with_retry(name, &self.activity_options, || {
            attempts.fetch_add(1, Ordering::Relaxed);
            attempt_fn()
        })
        .await
    }
}
