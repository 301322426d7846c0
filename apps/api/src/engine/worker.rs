use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use super::{
    ActivityOptions, EngineError, Workflow, WorkflowClient, WorkflowContext, WorkflowStatus,
};

const POLL_WAIT: Duration = Duration::from_secs(1);
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(2);
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub task_queue: String,
    pub max_concurrent_runs: usize,
    pub activity_options: ActivityOptions,
    /// Closed runs older than this are deleted by the periodic purge.
    pub retention: Duration,
    pub purge_interval: Duration,
}

/// Executes workflow runs from one task queue.
pub struct Worker {
    client: WorkflowClient,
    workflows: HashMap<&'static str, Arc<dyn Workflow>>,
    options: WorkerOptions,
    slots: Arc<Semaphore>,
}

impl Worker {
    pub fn new(client: WorkflowClient, options: WorkerOptions) -> Self {
        let slots = Arc::new(Semaphore::new(options.max_concurrent_runs.max(1)));
        Self {
            client,
            workflows: HashMap::new(),
            options,
            slots,
        }
    }

    pub fn register(mut self, workflow: Arc<dyn Workflow>) -> Self {
        self.workflows.insert(workflow.name(), workflow);
        self
    }

    pub fn task_queue(&self) -> &str {
        &self.options.task_queue
    }

    /// Polls until the process exits.
    pub async fn run(self: Arc<Self>) {
        self.run_until(std::future::pending()).await
    }

    /// Polls until `shutdown` resolves. Shutdown is only observed between
    /// polls: a dequeue that has been sent always runs to completion, since
    /// a cancelled blocking pop can still take an item off the queue. Runs
    /// already in flight keep going on their own tasks.
    pub async fn run_until(self: Arc<Self>, shutdown: impl Future<Output = ()>) {
        let queue = self.client.queue_name(&self.options.task_queue);
        info!(
            "Worker started on task queue: {} (workflows: {:?})",
            self.options.task_queue,
            self.workflows.keys().collect::<Vec<_>>()
        );

        let purger = tokio::spawn(self.clone().purge_periodically());
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                permit = self.slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match self.client.queue().dequeue(&queue, POLL_WAIT).await {
                Ok(Some(workflow_id)) => {
                    let worker = self.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(e) = worker.execute(&workflow_id).await {
                            error!("Workflow {workflow_id} could not be recorded: {e}");
                        }
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Polling task queue {} failed: {e}", self.options.task_queue);
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                }
            }

            let stopping = tokio::select! {
                biased;
                _ = &mut shutdown => true,
                _ = std::future::ready(()) => false,
            };
            if stopping {
                break;
            }
        }

        purger.abort();
        info!("Worker on task queue {} stopped", self.options.task_queue);
    }

    async fn purge_periodically(self: Arc<Self>) {
        let mut purge =
            tokio::time::interval(self.options.purge_interval.max(Duration::from_millis(1)));
        loop {
            purge.tick().await;
            if let Err(e) = self.purge_expired().await {
                warn!("Purge of closed workflows failed: {e}");
            }
        }
    }

    /// Runs one workflow to a terminal state and persists it.
    pub async fn execute(&self, workflow_id: &str) -> Result<WorkflowStatus, EngineError> {
        let records = self.client.records();
        let Some(mut record) = records.get(workflow_id).await? else {
            warn!("Dequeued workflow {workflow_id} has no record; skipping");
            return Err(EngineError::NotFound(workflow_id.to_string()));
        };

        if record.status.is_closed() {
            warn!(
                "Workflow {workflow_id} is already {}; skipping",
                record.status.name()
            );
            return Ok(record.status);
        }

        let now = Utc::now();
        if record.effective_status(now) == WorkflowStatus::TimedOut {
            record.close(
                WorkflowStatus::TimedOut,
                None,
                Some("execution deadline passed before the run started".to_string()),
            );
            records.put(workflow_id, &record).await?;
            return Ok(WorkflowStatus::TimedOut);
        }

        let Some(workflow) = self.workflows.get(record.workflow_type.as_str()).cloned() else {
            let message = format!("no workflow registered as '{}'", record.workflow_type);
            error!("Workflow {workflow_id} failed: {message}");
            record.close(WorkflowStatus::Failed, None, Some(message));
            records.put(workflow_id, &record).await?;
            return Ok(WorkflowStatus::Failed);
        };

        let remaining = (record.execution_deadline - now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let ctx = WorkflowContext::new(
            workflow_id,
            record.run_id,
            self.options.activity_options.clone(),
        );

        info!(
            "Executing workflow {} ({}) run {}",
            workflow_id, record.workflow_type, record.run_id
        );

        let outcome = tokio::time::timeout(remaining, workflow.run(&ctx, record.input.clone())).await;
        record.activity_attempts = ctx.activity_attempts();

        match outcome {
            Ok(Ok(output)) => {
                info!("Workflow {workflow_id} completed");
                record.close(WorkflowStatus::Completed, Some(output), None);
            }
            Ok(Err(e)) => {
                error!("Workflow {workflow_id} failed: {e}");
                record.close(WorkflowStatus::Failed, None, Some(e.to_string()));
            }
            Err(_) => {
                error!("Workflow {workflow_id} exceeded its execution deadline");
                record.close(
                    WorkflowStatus::TimedOut,
                    None,
                    Some("execution deadline exceeded".to_string()),
                );
            }
        }

        records.put(workflow_id, &record).await?;
        Ok(record.status)
    }

    /// Deletes closed runs whose close time is older than the retention period.
    pub async fn purge_expired(&self) -> Result<usize, EngineError> {
        let retention = chrono::Duration::from_std(self.options.retention)
            .unwrap_or_else(|_| chrono::Duration::days(3650));
        let cutoff = Utc::now() - retention;

        let records = self.client.records();
        let mut purged = 0;
        for record in records.list_decodable("").await? {
            let expired = record.status.is_closed()
                && record.closed_at.map(|at| at < cutoff).unwrap_or(false);
            if expired && records.delete(&record.workflow_id).await? {
                purged += 1;
            }
        }

        if purged > 0 {
            info!("Purged {purged} closed workflows past retention");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RetryPolicy, WorkflowError};
    use crate::store::{KeyValueStore, MemoryStore, StoreError, TaskQueue};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo;

    #[async_trait]
    impl Workflow for Echo {
        fn name(&self) -> &'static str {
            "Echo"
        }

        async fn run(&self, _ctx: &WorkflowContext, input: Value) -> Result<Value, WorkflowError> {
            Ok(json!({ "echo": input }))
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Workflow for AlwaysFails {
        fn name(&self) -> &'static str {
            "AlwaysFails"
        }

        async fn run(&self, ctx: &WorkflowContext, _input: Value) -> Result<Value, WorkflowError> {
            let value = ctx
                .execute_activity("broken", || async {
                    Err::<Value, _>(crate::engine::ActivityError::retryable("upstream 503"))
                })
                .await?;
            Ok(value)
        }
    }

    struct Sleeps;

    #[async_trait]
    impl Workflow for Sleeps {
        fn name(&self) -> &'static str {
            "Sleeps"
        }

        async fn run(&self, _ctx: &WorkflowContext, _input: Value) -> Result<Value, WorkflowError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    fn setup(execution_timeout: Duration) -> (WorkflowClient, Arc<Worker>) {
        let store = Arc::new(MemoryStore::new());
        worker_over(store.clone(), store, execution_timeout, DEFAULT_PURGE_INTERVAL)
    }

    fn worker_over(
        store: Arc<dyn KeyValueStore>,
        queue: Arc<dyn TaskQueue>,
        execution_timeout: Duration,
        purge_interval: Duration,
    ) -> (WorkflowClient, Arc<Worker>) {
        let client = WorkflowClient::new(store, queue, "test", execution_timeout);
        let worker = Worker::new(
            client.clone(),
            WorkerOptions {
                task_queue: "q".into(),
                max_concurrent_runs: 2,
                activity_options: ActivityOptions {
                    start_to_close_timeout: Duration::from_millis(100),
                    retry_policy: RetryPolicy {
                        initial_interval: Duration::from_millis(1),
                        backoff_coefficient: 2.0,
                        maximum_interval: Duration::from_millis(2),
                        maximum_attempts: 3,
                    },
                },
                retention: Duration::from_secs(3600),
                purge_interval,
            },
        )
        .register(Arc::new(Echo))
        .register(Arc::new(AlwaysFails))
        .register(Arc::new(Sleeps));
        (client, Arc::new(worker))
    }

    /// Queue whose pops take a while and that counts pops dropped midway.
    #[derive(Default)]
    struct SlowQueue {
        inner: MemoryStore,
        abandoned: AtomicUsize,
    }

    struct PendingPop<'a> {
        abandoned: &'a AtomicUsize,
        done: bool,
    }

    impl Drop for PendingPop<'_> {
        fn drop(&mut self) {
            if !self.done {
                self.abandoned.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[async_trait]
    impl TaskQueue for SlowQueue {
        async fn enqueue(&self, queue: &str, item: &str) -> Result<(), StoreError> {
            self.inner.enqueue(queue, item).await
        }

        async fn dequeue(&self, queue: &str, _wait: Duration) -> Result<Option<String>, StoreError> {
            let mut pending = PendingPop {
                abandoned: &self.abandoned,
                done: false,
            };
            tokio::time::sleep(Duration::from_millis(20)).await;
            let item = self.inner.dequeue(queue, Duration::from_millis(1)).await;
            pending.done = true;
            item
        }
    }

    #[tokio::test]
    async fn test_execute_completes_and_stores_output() {
        let (client, worker) = setup(Duration::from_secs(60));
        client
            .start_workflow("Echo", "echo-1", "q", &json!({"x": 1}))
            .await
            .unwrap();

        assert_eq!(
            worker.execute("echo-1").await.unwrap(),
            WorkflowStatus::Completed
        );
        let output: Value = client.get_workflow_handle("echo-1").result().await.unwrap();
        assert_eq!(output, json!({"echo": {"x": 1}}));
    }

    #[tokio::test]
    async fn test_execute_records_failure_after_retries() {
        let (client, worker) = setup(Duration::from_secs(60));
        client
            .start_workflow("AlwaysFails", "fail-1", "q", &json!({}))
            .await
            .unwrap();

        assert_eq!(worker.execute("fail-1").await.unwrap(), WorkflowStatus::Failed);
        let description = client
            .get_workflow_handle("fail-1")
            .describe()
            .await
            .unwrap();
        assert_eq!(description.status, WorkflowStatus::Failed);
        assert_eq!(description.activity_attempts, 3);
        assert!(description.failure.unwrap().contains("upstream 503"));
    }

    #[tokio::test]
    async fn test_unregistered_type_fails_run() {
        let (client, worker) = setup(Duration::from_secs(60));
        client
            .start_workflow("Unknown", "u-1", "q", &json!({}))
            .await
            .unwrap();
        assert_eq!(worker.execute("u-1").await.unwrap(), WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_execution_deadline_times_out_run() {
        let (client, worker) = setup(Duration::from_millis(50));
        client
            .start_workflow("Sleeps", "slow-1", "q", &json!({}))
            .await
            .unwrap();
        assert_eq!(
            worker.execute("slow-1").await.unwrap(),
            WorkflowStatus::TimedOut
        );
    }

    #[tokio::test]
    async fn test_closed_run_is_not_executed_twice() {
        let (client, worker) = setup(Duration::from_secs(60));
        client
            .start_workflow("Echo", "echo-1", "q", &json!(1))
            .await
            .unwrap();
        worker.execute("echo-1").await.unwrap();
        assert_eq!(
            worker.execute("echo-1").await.unwrap(),
            WorkflowStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_run_until_drains_queue() {
        let (client, worker) = setup(Duration::from_secs(60));
        client
            .start_workflow("Echo", "echo-1", "q", &json!("hi"))
            .await
            .unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn(worker.clone().run_until(async move {
            let _ = stop_rx.await;
        }));

        let handle = client.get_workflow_handle("echo-1");
        let mut status = WorkflowStatus::Running;
        for _ in 0..100 {
            status = handle.describe().await.unwrap().status;
            if status.is_closed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, WorkflowStatus::Completed);

        stop_tx.send(()).unwrap();
        running.await.unwrap();
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired_closed_runs() {
        let (client, worker) = setup(Duration::from_secs(60));
        for id in ["old", "new", "open"] {
            client
                .start_workflow("Echo", id, "q", &json!(null))
                .await
                .unwrap();
        }
        worker.execute("old").await.unwrap();
        worker.execute("new").await.unwrap();

        let mut old = client.records().get("old").await.unwrap().unwrap();
        old.closed_at = Some(Utc::now() - chrono::Duration::hours(2));
        client.records().put("old", &old).await.unwrap();

        assert_eq!(worker.purge_expired().await.unwrap(), 1);
        assert!(client.records().get("old").await.unwrap().is_none());
        assert!(client.records().get("new").await.unwrap().is_some());
        assert!(client.records().get("open").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_and_shutdown_never_cancel_a_dequeue() {
        let queue = Arc::new(SlowQueue::default());
        let (client, worker) = worker_over(
            Arc::new(MemoryStore::new()),
            queue.clone(),
            Duration::from_secs(60),
            Duration::from_millis(5),
        );
        for id in ["echo-1", "echo-2", "echo-3"] {
            client
                .start_workflow("Echo", id, "q", &json!(id))
                .await
                .unwrap();
        }

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn(worker.clone().run_until(async move {
            let _ = stop_rx.await;
        }));

        // Pops run back to back, so the stop signal arrives mid-pop.
        tokio::time::sleep(Duration::from_millis(207)).await;
        stop_tx.send(()).unwrap();
        running.await.unwrap();

        assert_eq!(queue.abandoned.load(Ordering::SeqCst), 0);
        for id in ["echo-1", "echo-2", "echo-3"] {
            let status = client.get_workflow_handle(id).describe().await.unwrap().status;
            assert_eq!(status, WorkflowStatus::Completed, "{id}");
        }
    }

    #[tokio::test]
    async fn test_purge_skips_undecodable_records() {
        let store = Arc::new(MemoryStore::new());
        let (client, worker) = worker_over(
            store.clone(),
            store.clone(),
            Duration::from_secs(60),
            DEFAULT_PURGE_INTERVAL,
        );
        client
            .start_workflow("Echo", "old", "q", &json!(null))
            .await
            .unwrap();
        worker.execute("old").await.unwrap();
        let mut old = client.records().get("old").await.unwrap().unwrap();
        old.closed_at = Some(Utc::now() - chrono::Duration::hours(2));
        client.records().put("old", &old).await.unwrap();

        store
            .put("test/workflows/corrupt", "{not json".to_string())
            .await
            .unwrap();

        assert_eq!(worker.purge_expired().await.unwrap(), 1);
        assert!(client.records().get("old").await.unwrap().is_none());
    }
}
