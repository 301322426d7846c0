use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{EngineError, WorkflowRecord, WorkflowStatus};
use crate::store::{KeyValueStore, Repository, TaskQueue};

/// Connection to the workflow engine. Created once at startup and cloned
/// into every request handler and worker.
#[derive(Clone)]
pub struct WorkflowClient {
    records: Repository<WorkflowRecord>,
    queue: Arc<dyn TaskQueue>,
    namespace: String,
    execution_timeout: Duration,
}

impl WorkflowClient {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        queue: Arc<dyn TaskQueue>,
        namespace: &str,
        execution_timeout: Duration,
    ) -> Self {
        Self {
            records: Repository::new(store, format!("{namespace}/workflows/")),
            queue,
            namespace: namespace.to_string(),
            execution_timeout,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub(crate) fn records(&self) -> &Repository<WorkflowRecord> {
        &self.records
    }

    pub(crate) fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    /// Queue names are scoped to the namespace so two namespaces on one
    /// store never share workers.
    pub(crate) fn queue_name(&self, task_queue: &str) -> String {
        format!("{}/{}", self.namespace, task_queue)
    }

    /// Records a new run and hands it to the workers on `task_queue`.
    /// Returns as soon as the run is queued.
    pub async fn start_workflow<I: Serialize>(
        &self,
        workflow_type: &str,
        workflow_id: &str,
        task_queue: &str,
        input: &I,
    ) -> Result<WorkflowHandle, EngineError> {
        if self.records.get(workflow_id).await?.is_some() {
            return Err(EngineError::AlreadyStarted(workflow_id.to_string()));
        }

        let started_at = Utc::now();
        let execution_timeout = chrono::Duration::from_std(self.execution_timeout)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let record = WorkflowRecord {
            workflow_id: workflow_id.to_string(),
            run_id: Uuid::new_v4(),
            workflow_type: workflow_type.to_string(),
            task_queue: task_queue.to_string(),
            status: WorkflowStatus::Running,
            input: serde_json::to_value(input)?,
            output: None,
            failure: None,
            activity_attempts: 0,
            started_at,
            execution_deadline: started_at + execution_timeout,
            closed_at: None,
        };

        self.records.put(workflow_id, &record).await?;
        self.queue
            .enqueue(&self.queue_name(task_queue), workflow_id)
            .await?;

        info!(
            "Started workflow {} ({}) run {} on {}",
            workflow_id, workflow_type, record.run_id, task_queue
        );

        Ok(WorkflowHandle {
            client: self.clone(),
            workflow_id: workflow_id.to_string(),
            run_id: Some(record.run_id),
        })
    }

    /// A handle to an existing run. Does not check that the run exists.
    pub fn get_workflow_handle(&self, workflow_id: &str) -> WorkflowHandle {
        WorkflowHandle {
            client: self.clone(),
            workflow_id: workflow_id.to_string(),
            run_id: None,
        }
    }
}

/// Snapshot of a run's lifecycle state.
#[derive(Debug, Clone)]
pub struct WorkflowDescription {
    pub workflow_id: String,
    pub run_id: Uuid,
    pub workflow_type: String,
    pub status: WorkflowStatus,
    pub failure: Option<String>,
    pub activity_attempts: u32,
}

#[derive(Clone)]
pub struct WorkflowHandle {
    client: WorkflowClient,
    workflow_id: String,
    run_id: Option<Uuid>,
}

impl WorkflowHandle {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Engine-assigned run token, known only for handles returned by a start.
    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    async fn load(&self) -> Result<WorkflowRecord, EngineError> {
        self.client
            .records
            .get(&self.workflow_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(self.workflow_id.clone()))
    }

    pub async fn describe(&self) -> Result<WorkflowDescription, EngineError> {
        let record = self.load().await?;
        Ok(WorkflowDescription {
            status: record.effective_status(Utc::now()),
            workflow_id: record.workflow_id,
            run_id: record.run_id,
            workflow_type: record.workflow_type,
            failure: record.failure,
            activity_attempts: record.activity_attempts,
        })
    }

    /// Fetches the stored output of a completed run.
    pub async fn result<T: DeserializeOwned>(&self) -> Result<T, EngineError> {
        let record = self.load().await?;
        let unavailable = |reason: String| EngineError::ResultUnavailable {
            workflow_id: self.workflow_id.clone(),
            reason,
        };

        if record.status != WorkflowStatus::Completed {
            return Err(unavailable(format!(
                "workflow is {}",
                record.effective_status(Utc::now()).name()
            )));
        }

        let output = record
            .output
            .ok_or_else(|| unavailable("no output was stored".to_string()))?;

        serde_json::from_value(output).map_err(|e| unavailable(format!("malformed output: {e}")))
    }
}
