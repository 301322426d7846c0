//! Time-boxed reviewer links and the comments reviewers leave through them.

pub mod handlers;
pub mod tokens;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::store::{KeyValueStore, Repository, StoreError};

pub use tokens::{ReviewClaims, ReviewSigner, TokenError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewLink {
    pub link_id: String,
    pub document_id: String,
    pub reviewer_email: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub id: String,
    pub document_id: String,
    pub target_path: String,
    pub comment_text: String,
    pub reviewer_email: String,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
}

/// `{prefix}_{16 hex chars}`.
pub fn random_id(prefix: &str) -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("{prefix}_{hex}")
}

/// Links by id, comments by `{document_id}/{comment_id}`, and a comment id
/// index pointing back at the document.
#[derive(Clone)]
pub struct ReviewStore {
    links: Repository<ReviewLink>,
    comments: Repository<ReviewComment>,
    comment_index: Repository<String>,
}

impl ReviewStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            links: Repository::new(store.clone(), "review/links/"),
            comments: Repository::new(store.clone(), "review/comments/"),
            comment_index: Repository::new(store, "review/comment_index/"),
        }
    }

    pub async fn save_link(&self, link: &ReviewLink) -> Result<(), StoreError> {
        self.links.put(&link.link_id, link).await
    }

    pub async fn link(&self, link_id: &str) -> Result<Option<ReviewLink>, StoreError> {
        self.links.get(link_id).await
    }

    pub async fn add_comment(&self, comment: &ReviewComment) -> Result<(), StoreError> {
        self.comments
            .put(&comment_key(&comment.document_id, &comment.id), comment)
            .await?;
        self.comment_index
            .put(&comment.id, &comment.document_id)
            .await
    }

    /// Comments on one document, oldest first.
    pub async fn comments_for(&self, document_id: &str) -> Result<Vec<ReviewComment>, StoreError> {
        let mut comments: Vec<ReviewComment> = self
            .comments
            .list(&format!("{document_id}/"))
            .await?
            .into_iter()
            .filter(|c| c.document_id == document_id)
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    /// Marks a comment resolved. `None` if no comment has that id.
    pub async fn resolve(&self, comment_id: &str) -> Result<Option<ReviewComment>, StoreError> {
        let Some(document_id) = self.comment_index.get(comment_id).await? else {
            return Ok(None);
        };
        let key = comment_key(&document_id, comment_id);
        let Some(mut comment) = self.comments.get(&key).await? else {
            return Ok(None);
        };
        comment.resolved = true;
        self.comments.put(&key, &comment).await?;
        Ok(Some(comment))
    }
}

fn comment_key(document_id: &str, comment_id: &str) -> String {
    format!("{document_id}/{comment_id}")
}
