pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::documents::handlers::{self as documents, MAX_UPLOAD_BYTES};
use crate::edits::handlers as edits;
use crate::privacy::handlers as privacy;
use crate::research::handlers as research;
use crate::review::handlers as review;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::root_handler))
        .route("/health", get(health::health_handler))
        // Research jobs
        .route(
            "/api/research-agent/analyze",
            post(research::handle_analyze),
        )
        .route(
            "/api/research-agent/status/:workflow_id",
            get(research::handle_status),
        )
        .route("/api/research/analyze", post(research::handle_research_topic))
        // Documents
        .route(
            "/api/documents/upload",
            post(documents::handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        // Edit review runs
        .route("/api/workflow/submit_edits", post(edits::handle_submit_edits))
        .route(
            "/api/workflow/resolve_suggestions",
            post(edits::handle_resolve_suggestions),
        )
        .route("/api/workflow/approve", post(edits::handle_approve))
        .route("/api/workflow/status/:run_id", get(edits::handle_run_status))
        // Privacy
        .route(
            "/api/privacy/delete_my_data",
            post(privacy::handle_delete_my_data),
        )
        .route(
            "/api/privacy/deletion_status/:user_id",
            get(privacy::handle_deletion_status),
        )
        .route("/api/privacy/scrub_logs", post(privacy::handle_scrub_logs))
        .route(
            "/api/privacy/validate_scrubber",
            get(privacy::handle_validate_scrubber),
        )
        .route(
            "/api/privacy/backup_policy",
            get(privacy::handle_backup_policy),
        )
        // Review links
        .route("/api/review/create_link", post(review::handle_create_link))
        .route("/api/review/verify/:token", get(review::handle_verify))
        .route("/api/review/comment/:token", post(review::handle_add_comment))
        .route(
            "/api/review/comments/:document_id",
            get(review::handle_get_comments),
        )
        .route(
            "/api/review/resolve/:comment_id",
            post(review::handle_resolve),
        )
        .with_state(state)
}

/// Helpers for driving the router in tests.
#[cfg(test)]
pub mod testing {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use tower::ServiceExt;

    /// Sends one request and decodes the body as JSON (`Null` when empty).
    pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        // Extractor rejections answer in plain text.
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    pub async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        send(router, request).await
    }

    pub async fn post_json(router: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(router, request).await
    }
}
