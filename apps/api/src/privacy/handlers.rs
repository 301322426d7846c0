use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::privacy::scrub::{check, scrub_pii, ScrubCheck};
use crate::state::AppState;

const DELETE_CONFIRMATION: &str = "DELETE";

/// Log lines used to exercise the scrubber until real log shipping exists.
const SAMPLE_LOG_ENTRIES: [&str; 3] = [
    "User email: john@example.com logged in",
    "Phone number 555-123-4567 was verified",
    "Payment from card 4532-1234-5678-9012 processed",
];

const SCRUBBER_CASES: [&str; 3] = [
    "Contact me at test@email.com or call 555-123-4567",
    "SSN: 123-45-6789, Card: 4532-1234-5678-9012",
    "Normal text without PII",
];

#[derive(Deserialize)]
pub struct DeleteDataRequest {
    pub user_id: String,
    /// Must be exactly `DELETE`.
    pub confirmation: String,
}

#[derive(Serialize)]
pub struct DeleteDataResponse {
    pub success: bool,
    pub message: String,
    pub files_deleted: usize,
    pub confirmation_id: String,
}

/// POST /api/privacy/delete_my_data
pub async fn handle_delete_my_data(
    State(state): State<AppState>,
    Json(req): Json<DeleteDataRequest>,
) -> Result<Json<DeleteDataResponse>, AppError> {
    if req.confirmation != DELETE_CONFIRMATION {
        return Err(AppError::BadRequest(
            "Confirmation must be 'DELETE' to proceed".to_string(),
        ));
    }

    let record = state
        .privacy
        .user(&req.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User data not found".to_string()))?;
    let files_deleted = record.files.len();

    // Keep going past failures; the record is cut down to what is still stored.
    let mut remaining = Vec::new();
    let mut failure = None;
    for file in record.files {
        if let Err(e) = state.blobs.delete(&file.blob_key).await {
            warn!("Failed to delete {} for user {}: {e}", file.blob_key, req.user_id);
            remaining.push(file);
            failure = Some(e);
        }
    }
    if let Some(e) = failure {
        state.privacy.retain_files(&req.user_id, remaining).await?;
        return Err(e.into());
    }

    let log = state
        .privacy
        .record_deletion(&req.user_id, files_deleted)
        .await?;

    info!(
        "Deleted data for user {} ({} files, {})",
        req.user_id, log.files_deleted, log.confirmation_id
    );

    Ok(Json(DeleteDataResponse {
        success: true,
        message: "All user data deleted successfully".to_string(),
        files_deleted: log.files_deleted,
        confirmation_id: log.confirmation_id,
    }))
}

/// GET /api/privacy/deletion_status/:user_id
pub async fn handle_deletion_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if let Some(log) = state.privacy.deletion(&user_id).await? {
        return Ok(Json(json!({
            "deleted": true,
            "deleted_at": log.deleted_at,
            "files_deleted": log.files_deleted,
        })));
    }

    if state.privacy.user(&user_id).await?.is_some() {
        return Ok(Json(json!({
            "deleted": false,
            "data_exists": true,
        })));
    }

    Ok(Json(json!({
        "deleted": false,
        "data_exists": false,
        "message": "No data found for this user",
    })))
}

/// POST /api/privacy/scrub_logs
pub async fn handle_scrub_logs() -> Json<Value> {
    let scrubbed: Vec<String> = SAMPLE_LOG_ENTRIES.iter().map(|e| scrub_pii(e)).collect();
    let changed = SAMPLE_LOG_ENTRIES
        .iter()
        .zip(&scrubbed)
        .filter(|(original, scrubbed)| **original != scrubbed.as_str())
        .count();

    Json(json!({
        "success": true,
        "logs_scrubbed": changed,
        "sample_output": scrubbed,
    }))
}

/// GET /api/privacy/validate_scrubber
pub async fn handle_validate_scrubber() -> Json<Value> {
    let results: Vec<ScrubCheck> = SCRUBBER_CASES.iter().map(|c| check(c)).collect();
    let validated = results.iter().all(|r| r.valid);

    Json(json!({
        "validated": validated,
        "test_results": results,
    }))
}

/// GET /api/privacy/backup_policy
pub async fn handle_backup_policy() -> Json<Value> {
    Json(json!({
        "policy": "30-day retention",
        "backup_location": "Encrypted S3 bucket",
        "deletion_propagation": "Backups purged after 30 days",
        "note": "Deleted data may exist in backups for up to 30 days",
    }))
}
