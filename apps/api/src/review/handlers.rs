use std::sync::LazyLock;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::review::{random_id, ReviewClaims, ReviewComment, ReviewLink};
use crate::state::AppState;

const DEFAULT_EXPIRY_HOURS: i64 = 72;
const MAX_EXPIRY_HOURS: i64 = 24 * 365;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
});

fn default_expiry_hours() -> i64 {
    DEFAULT_EXPIRY_HOURS
}

#[derive(Deserialize)]
pub struct CreateLinkRequest {
    pub document_id: String,
    pub reviewer_email: String,
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: i64,
}

#[derive(Serialize)]
pub struct CreateLinkResponse {
    pub link_id: String,
    pub review_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub document_id: String,
    pub reviewer_email: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub valid: bool,
}

#[derive(Deserialize)]
pub struct AddCommentRequest {
    pub target_path: String,
    pub comment_text: String,
}

#[derive(Serialize)]
pub struct CommentResponse {
    pub success: bool,
    pub comment_id: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct CommentsResponse {
    pub document_id: String,
    pub comments: Vec<ReviewComment>,
    pub count: usize,
}

fn verify_token(state: &AppState, token: &str) -> Result<ReviewClaims, AppError> {
    Ok(state.review_signer.verify(token)?)
}

/// POST /api/review/create_link
pub async fn handle_create_link(
    State(state): State<AppState>,
    Json(req): Json<CreateLinkRequest>,
) -> Result<Json<CreateLinkResponse>, AppError> {
    if req.document_id.trim().is_empty() {
        return Err(AppError::Validation("document_id must not be empty".into()));
    }
    if !EMAIL.is_match(&req.reviewer_email) {
        return Err(AppError::Validation(format!(
            "reviewer_email is not a valid email address: {}",
            req.reviewer_email
        )));
    }
    if !(1..=MAX_EXPIRY_HOURS).contains(&req.expiry_hours) {
        return Err(AppError::Validation(format!(
            "expiry_hours must be between 1 and {MAX_EXPIRY_HOURS}"
        )));
    }

    let created_at = Utc::now();
    let expires_at = created_at + Duration::hours(req.expiry_hours);
    let token = state
        .review_signer
        .issue(&req.document_id, &req.reviewer_email, expires_at)?;

    let link = ReviewLink {
        link_id: random_id("link"),
        document_id: req.document_id,
        reviewer_email: req.reviewer_email,
        created_at,
        expires_at,
        token,
    };
    state.reviews.save_link(&link).await?;

    info!(
        "Created review link {} for document {}",
        link.link_id, link.document_id
    );

    Ok(Json(CreateLinkResponse {
        review_url: format!(
            "{}/review/{}",
            state.config.review_base_url.trim_end_matches('/'),
            link.token
        ),
        link_id: link.link_id,
        expires_at,
    }))
}

/// GET /api/review/verify/:token
pub async fn handle_verify(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<VerifyResponse>, AppError> {
    let claims = verify_token(&state, &token)?;
    Ok(Json(VerifyResponse {
        expires_at: claims.expires_at(),
        document_id: claims.document_id,
        reviewer_email: claims.reviewer_email,
        valid: true,
    }))
}

/// POST /api/review/comment/:token
pub async fn handle_add_comment(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<AddCommentRequest>,
) -> Result<Json<CommentResponse>, AppError> {
    let claims = verify_token(&state, &token)?;
    if req.comment_text.trim().is_empty() {
        return Err(AppError::Validation("comment_text must not be empty".into()));
    }

    let comment = ReviewComment {
        id: random_id("comment"),
        document_id: claims.document_id,
        target_path: req.target_path,
        comment_text: req.comment_text,
        reviewer_email: claims.reviewer_email,
        created_at: Utc::now(),
        resolved: false,
    };
    state.reviews.add_comment(&comment).await?;

    Ok(Json(CommentResponse {
        success: true,
        comment_id: comment.id,
        message: "Comment added successfully".to_string(),
    }))
}

/// GET /api/review/comments/:document_id
pub async fn handle_get_comments(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Json<CommentsResponse>, AppError> {
    let comments = state.reviews.comments_for(&document_id).await?;
    Ok(Json(CommentsResponse {
        count: comments.len(),
        document_id,
        comments,
    }))
}

/// POST /api/review/resolve/:comment_id
pub async fn handle_resolve(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
) -> Result<Json<CommentResponse>, AppError> {
    state
        .reviews
        .resolve(&comment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

    Ok(Json(CommentResponse {
        success: true,
        comment_id,
        message: "Comment resolved".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::build_router;
    use crate::routes::testing::{get_json, post_json};
    use crate::state::testing::test_state;

    use super::*;

    fn token_from(review_url: &str) -> String {
        review_url.rsplit('/').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_link_comment_resolve_flow() {
        let (state, _) = test_state();
        let app = build_router(state);

        let (status, link) = post_json(
            app.clone(),
            "/api/review/create_link",
            json!({"document_id": "doc-1", "reviewer_email": "rev@example.com"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(link["link_id"].as_str().unwrap().starts_with("link_"));
        let review_url = link["review_url"].as_str().unwrap();
        assert!(review_url.starts_with("http://localhost:3000/review/"));
        let token = token_from(review_url);

        let (status, verified) = get_json(app.clone(), &format!("/api/review/verify/{token}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(verified["document_id"], "doc-1");
        assert_eq!(verified["valid"], true);

        let (status, added) = post_json(
            app.clone(),
            &format!("/api/review/comment/{token}"),
            json!({"target_path": "experience[0]", "comment_text": "Add metrics"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let comment_id = added["comment_id"].as_str().unwrap().to_string();
        assert!(comment_id.starts_with("comment_"));

        let (_, listed) = get_json(app.clone(), "/api/review/comments/doc-1").await;
        assert_eq!(listed["count"], 1);
        assert_eq!(listed["comments"][0]["reviewer_email"], "rev@example.com");
        assert_eq!(listed["comments"][0]["resolved"], false);

        let (status, _) =
            post_json(app.clone(), &format!("/api/review/resolve/{comment_id}"), json!({})).await;
        assert_eq!(status, StatusCode::OK);

        let (_, listed) = get_json(app, "/api/review/comments/doc-1").await;
        assert_eq!(listed["comments"][0]["resolved"], true);
    }

    #[tokio::test]
    async fn test_expired_link_is_forbidden() {
        let (state, _) = test_state();
        let token = state
            .review_signer
            .issue("doc-1", "rev@example.com", Utc::now() - Duration::hours(1))
            .unwrap();

        let (status, body) =
            get_json(build_router(state), &format!("/api/review/verify/{token}")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["message"], "Review link has expired");
    }

    #[tokio::test]
    async fn test_tampered_link_is_forbidden() {
        let (state, _) = test_state();
        let (status, body) = post_json(
            build_router(state),
            "/api/review/comment/abc.def.ghi",
            json!({"target_path": "x", "comment_text": "y"}),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["message"], "Invalid review link");
    }

    #[tokio::test]
    async fn test_create_link_validates_input() {
        let (state, _) = test_state();
        let app = build_router(state);

        let (status, _) = post_json(
            app.clone(),
            "/api/review/create_link",
            json!({"document_id": "doc-1", "reviewer_email": "not-an-email"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = post_json(
            app,
            "/api/review/create_link",
            json!({"document_id": "doc-1", "reviewer_email": "a@b.io", "expiry_hours": 0}),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_resolve_unknown_comment_is_404() {
        let (state, _) = test_state();
        let (status, _) =
            post_json(build_router(state), "/api/review/resolve/comment_0000", json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
