use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::edits::EditRunStatus;
use crate::errors::AppError;
use crate::state::AppState;

const RUN_NOT_FOUND: &str = "Workflow run not found";

#[derive(Deserialize)]
pub struct SubmitEditsRequest {
    pub run_id: String,
    pub edits: Vec<Value>,
}

#[derive(Deserialize)]
pub struct ResolveSuggestionsRequest {
    pub run_id: String,
    pub suggestion_ids: Vec<String>,
}

#[derive(Deserialize)]
pub struct ApproveRequest {
    pub run_id: String,
}

#[derive(Serialize)]
pub struct RunUpdateResponse {
    pub success: bool,
    pub run_id: String,
    pub status: EditRunStatus,
    pub message: String,
}

#[derive(Serialize)]
pub struct ResolveResponse {
    pub success: bool,
    pub run_id: String,
    pub resolved_count: usize,
    pub message: String,
}

#[derive(Serialize)]
pub struct RunStatusResponse {
    pub run_id: String,
    pub status: EditRunStatus,
    pub edits_count: usize,
    pub suggestions_resolved: usize,
}

fn require_run_id(run_id: &str) -> Result<(), AppError> {
    if run_id.trim().is_empty() {
        return Err(AppError::Validation("run_id must not be empty".to_string()));
    }
    Ok(())
}

/// POST /api/workflow/submit_edits
pub async fn handle_submit_edits(
    State(state): State<AppState>,
    Json(req): Json<SubmitEditsRequest>,
) -> Result<Json<RunUpdateResponse>, AppError> {
    require_run_id(&req.run_id)?;
    let submitted = req.edits.len();
    let run = state.edits.submit_edits(&req.run_id, req.edits).await?;

    info!(
        "Run {}: {submitted} edits submitted ({} total)",
        run.run_id,
        run.edits.len()
    );

    Ok(Json(RunUpdateResponse {
        success: true,
        run_id: run.run_id,
        status: run.status,
        message: "Edits submitted for validation".to_string(),
    }))
}

/// POST /api/workflow/resolve_suggestions
pub async fn handle_resolve_suggestions(
    State(state): State<AppState>,
    Json(req): Json<ResolveSuggestionsRequest>,
) -> Result<Json<ResolveResponse>, AppError> {
    let resolved_count = req.suggestion_ids.len();
    let run = state
        .edits
        .resolve_suggestions(&req.run_id, req.suggestion_ids)
        .await?
        .ok_or_else(|| AppError::NotFound(RUN_NOT_FOUND.to_string()))?;

    Ok(Json(ResolveResponse {
        success: true,
        run_id: run.run_id,
        resolved_count,
        message: "Suggestions resolved".to_string(),
    }))
}

/// POST /api/workflow/approve
pub async fn handle_approve(
    State(state): State<AppState>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<RunUpdateResponse>, AppError> {
    let run = state
        .edits
        .approve(&req.run_id)
        .await?
        .ok_or_else(|| AppError::NotFound(RUN_NOT_FOUND.to_string()))?;

    info!("Run {} approved", run.run_id);

    Ok(Json(RunUpdateResponse {
        success: true,
        run_id: run.run_id,
        status: run.status,
        message: "Document approved and exported".to_string(),
    }))
}

/// GET /api/workflow/status/:run_id
pub async fn handle_run_status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunStatusResponse>, AppError> {
    let run = state
        .edits
        .run(&run_id)
        .await?
        .ok_or_else(|| AppError::NotFound(RUN_NOT_FOUND.to_string()))?;

    Ok(Json(RunStatusResponse {
        edits_count: run.edits.len(),
        suggestions_resolved: run.suggestions_resolved.len(),
        run_id: run.run_id,
        status: run.status,
    }))
}
