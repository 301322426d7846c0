//! Standalone workflow worker: polls the research task queue and runs
//! `ResearchWorkflow` against the configured model.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use talent_api::config::Config;
use talent_api::engine::{
    ActivityOptions, Worker, WorkerOptions, WorkflowClient, DEFAULT_PURGE_INTERVAL,
};
use talent_api::llm_client::LlmClient;
use talent_api::research::workflow::ResearchWorkflow;
use talent_api::store;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("talent_api={}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    config
        .engine
        .address
        .as_deref()
        .context("ENGINE_ADDRESS must be set to run a standalone worker")?;
    config.model.require_api_key()?;

    let (records, queue) = store::open(config.engine.address.as_deref()).await?;
    let engine = WorkflowClient::new(
        records,
        queue,
        &config.engine.namespace,
        config.engine.execution_timeout,
    );

    // Activity retries own the retry budget; the client makes a single attempt.
    let llm = LlmClient::new(&config.model)?.with_max_retries(1);
    info!("LLM client initialized (model: {})", llm.model());

    let options = WorkerOptions {
        task_queue: config.engine.task_queue.clone(),
        max_concurrent_runs: config.engine.worker_concurrency,
        activity_options: ActivityOptions::new(
            config.model.timeout,
            config.engine.activity_max_attempts,
        ),
        retention: config.engine.retention,
        purge_interval: DEFAULT_PURGE_INTERVAL,
    };

    let worker = Worker::new(engine, options).register(Arc::new(ResearchWorkflow::new(Arc::new(llm))));
    info!(
        "Research worker starting on task queue {} (namespace {})",
        worker.task_queue(),
        config.engine.namespace
    );

    Arc::new(worker).run().await;
    Ok(())
}
