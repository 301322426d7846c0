use axum::{
    extract::{Multipart, State},
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::documents::parser::{DocumentParser, DocumentType};
use crate::errors::AppError;
use crate::privacy::StoredFile;
use crate::state::AppState;

/// Upload size accepted by the upload route.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Serialize)]
pub struct UploadResponse {
    pub file_id: String,
    pub filename: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub text: String,
    pub char_count: usize,
    /// Whether the original file was kept for the user.
    pub stored: bool,
}

/// POST /api/documents/upload
///
/// Multipart fields: `file` (required), `user_id` (optional). Without a user
/// the document is parsed and discarded.
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut user_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(base_name)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| AppError::BadRequest("file field has no filename".into()))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;
                file = Some((filename, data));
            }
            "user_id" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read user_id: {e}")))?;
                let value = value.trim();
                if !value.is_empty() {
                    user_id = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    let (filename, data) =
        file.ok_or_else(|| AppError::BadRequest("Missing 'file' field".to_string()))?;
    if data.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
    }

    let parse_data = data.clone();
    let parse_name = filename.clone();
    let parsed = tokio::task::spawn_blocking(move || {
        DocumentParser::parse_document(&parse_data, &parse_name)
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("document parser task failed: {e}")))??;

    let file_id = Uuid::new_v4().to_string();
    let stored = match &user_id {
        Some(user_id) => {
            let blob_key = format!("uploads/{user_id}/{file_id}/{filename}");
            let content_type = parsed.doc_type.content_type();
            let size_bytes = data.len();
            state.blobs.put(&blob_key, data, content_type).await?;
            state
                .privacy
                .register_upload(
                    user_id,
                    StoredFile {
                        file_id: file_id.clone(),
                        filename: filename.clone(),
                        blob_key,
                        content_type: content_type.to_string(),
                        size_bytes,
                        uploaded_at: Utc::now(),
                    },
                )
                .await?;
            true
        }
        None => false,
    };

    info!(
        "Parsed {} ({:?}, {} chars, stored: {stored})",
        filename,
        parsed.doc_type,
        parsed.text.chars().count()
    );

    Ok(Json(UploadResponse {
        char_count: parsed.text.chars().count(),
        file_id,
        filename,
        doc_type: parsed.doc_type,
        text: parsed.text,
        stored,
    }))
}

/// Drops any client-side directory components.
fn base_name(filename: &str) -> String {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    use crate::documents::parser::tests::sample_docx;
    use crate::routes::build_router;
    use crate::routes::testing::send;
    use crate::state::testing::test_state;

    use super::*;

    const BOUNDARY: &str = "talent-test-boundary";

    fn multipart_request(filename: &str, data: &[u8], user_id: Option<&str>) -> Request<Body> {
        let mut body = Vec::new();
        if let Some(user_id) = user_id {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"user_id\"\r\n\r\n{user_id}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/documents/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[test]
    fn test_base_name_strips_directories() {
        assert_eq!(base_name("C:\\Users\\me\\resume.docx"), "resume.docx");
        assert_eq!(base_name("../../etc/resume.pdf"), "resume.pdf");
    }

    #[tokio::test]
    async fn test_upload_without_user_parses_only() {
        let (state, _) = test_state();
        let (status, body) = send(
            build_router(state),
            multipart_request("resume.docx", &sample_docx(), None),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "docx");
        assert_eq!(body["filename"], "resume.docx");
        assert!(body["text"].as_str().unwrap().starts_with("Jane Doe"));
        assert_eq!(
            body["char_count"],
            body["text"].as_str().unwrap().chars().count()
        );
        assert_eq!(body["stored"], false);
    }

    #[tokio::test]
    async fn test_upload_with_user_stores_blob_and_record() {
        let (state, blobs) = test_state();
        let privacy = state.privacy.clone();
        let (status, body) = send(
            build_router(state),
            multipart_request("resume.docx", &sample_docx(), Some("user-7")),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stored"], true);
        let file_id = body["file_id"].as_str().unwrap();
        let key = format!("uploads/user-7/{file_id}/resume.docx");
        assert!(blobs.contains(&key).await);

        let record = privacy.user("user-7").await.unwrap().unwrap();
        assert_eq!(record.files.len(), 1);
        assert_eq!(record.files[0].blob_key, key);
    }

    #[tokio::test]
    async fn test_unsupported_extension_is_rejected() {
        let (state, _) = test_state();
        let (status, body) = send(
            build_router(state),
            multipart_request("notes.txt", b"hello", None),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "DOCUMENT_ERROR");
    }

    #[tokio::test]
    async fn test_missing_file_field_is_bad_request() {
        let (state, _) = test_state();
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"user_id\"\r\n\r\nu1\r\n--{BOUNDARY}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/documents/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let (status, _) = send(build_router(state), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
