use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::{EngineError, WorkflowStatus};
use crate::errors::AppError;
use crate::research::agent::ResearchAgent;
use crate::research::prompts::AGENT_NAME;
use crate::research::models::{
    ResearchRequest, ResearchResult, ResearchWorkflowResult, TopicRequest, UsageCounters,
};
use crate::research::workflow::RESEARCH_WORKFLOW;
use crate::state::AppState;

pub const WORKFLOW_ID_PREFIX: &str = "research-";

/// Job state as reported to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Serialize)]
pub struct SubmissionResponse {
    pub request_id: String,
    pub workflow_id: String,
    pub job_title: String,
    pub job_url: Option<String>,
    pub status: JobStatus,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub request_id: String,
    pub workflow_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageCounters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct TopicResponse {
    pub request_id: String,
    pub topic: String,
    pub result: ResearchResult,
    pub usage: UsageCounters,
}

/// POST /api/research-agent/analyze
///
/// Starts a research workflow and returns without waiting for it.
pub async fn handle_analyze(
    State(state): State<AppState>,
    Json(req): Json<ResearchRequest>,
) -> Result<Json<SubmissionResponse>, AppError> {
    req.validate().map_err(AppError::Validation)?;

    let request_id = Uuid::new_v4().to_string();
    let workflow_id = format!("{WORKFLOW_ID_PREFIX}{}", Uuid::new_v4());

    info!(
        "[{request_id}] Starting research workflow {workflow_id}: {}",
        req.job_title
    );

    state
        .engine
        .start_workflow(
            RESEARCH_WORKFLOW,
            &workflow_id,
            &state.config.engine.task_queue,
            &req,
        )
        .await
        .map_err(|e| {
            error!("[{request_id}] Failed to start workflow: {e}");
            AppError::Engine(format!("Failed to start research workflow: {e}"))
        })?;

    Ok(Json(SubmissionResponse {
        request_id,
        workflow_id,
        job_title: req.job_title,
        job_url: req.job_url,
        status: JobStatus::Running,
    }))
}

/// GET /api/research-agent/status/:workflow_id
///
/// Pure read of engine state; safe to poll at any interval.
pub async fn handle_status(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let request_id = Uuid::new_v4().to_string();
    let handle = state.engine.get_workflow_handle(&workflow_id);

    let description = handle.describe().await.map_err(|e| match e {
        EngineError::NotFound(_) => AppError::NotFound(format!("Workflow {workflow_id} not found")),
        other => AppError::Engine(format!("Failed to get workflow status: {other}")),
    })?;

    let mut response = StatusResponse {
        request_id,
        workflow_id,
        status: JobStatus::Running,
        job_title: None,
        job_url: None,
        result: None,
        usage: None,
        error: None,
    };

    match description.status {
        WorkflowStatus::Running => {}
        WorkflowStatus::Completed => {
            response.status = JobStatus::Completed;
            match handle.result::<ResearchWorkflowResult>().await {
                Ok(output) => {
                    response.job_title = Some(output.job_title);
                    response.job_url = output.job_url;
                    response.result = Some(output.result);
                    response.usage = Some(output.usage);
                }
                Err(e) => {
                    warn!(
                        "[{}] Workflow {} completed but its result could not be fetched: {e}",
                        response.request_id, response.workflow_id
                    );
                    response.error = Some(format!("Failed to fetch workflow result: {e}"));
                }
            }
        }
        other => {
            response.status = JobStatus::Failed;
            response.error = Some(other.name().to_string());
        }
    }

    Ok(Json(response))
}

/// POST /api/research/analyze
///
/// Runs the research agent inline on a free-form topic.
pub async fn handle_research_topic(
    State(state): State<AppState>,
    Json(req): Json<TopicRequest>,
) -> Result<Json<TopicResponse>, AppError> {
    req.validate().map_err(AppError::Validation)?;

    let generator = state.llm.as_ref().ok_or_else(|| {
        AppError::Llm("Research agent failed: OPENAI_API_KEY is not configured".to_string())
    })?;

    let request_id = Uuid::new_v4().to_string();
    let preview: String = req.topic.chars().take(100).collect();
    info!("[{request_id}] {AGENT_NAME} starting: {preview}...");

    let run = ResearchAgent::new()
        .run(generator.as_ref(), &req.topic)
        .await
        .map_err(|e| {
            error!("[{request_id}] {AGENT_NAME} failed: {e}");
            AppError::Llm(format!("Research agent failed: {e}"))
        })?;

    info!(
        "[{request_id}] {AGENT_NAME} completed - Tokens: {}",
        run.usage.total_tokens
    );

    Ok(Json(TopicResponse {
        request_id,
        topic: req.topic,
        result: run.output,
        usage: run.usage,
    }))
}
