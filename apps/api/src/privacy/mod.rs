//! User data records, deletion on request, and PII scrubbing.

pub mod handlers;
pub mod scrub;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{KeyValueStore, Repository, StoreError};

/// A document the user uploaded and we kept a copy of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub file_id: String,
    pub filename: String,
    pub blob_key: String,
    pub content_type: String,
    pub size_bytes: usize,
    pub uploaded_at: DateTime<Utc>,
}

/// Everything held for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDataRecord {
    pub user_id: String,
    pub files: Vec<StoredFile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Audit entry written when a user's data is purged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionLog {
    pub user_id: String,
    pub deleted_at: DateTime<Utc>,
    pub files_deleted: usize,
    pub confirmation_id: String,
}

#[derive(Clone)]
pub struct PrivacyStore {
    users: Repository<UserDataRecord>,
    /// Append-only audit trail keyed by zero-padded sequence number.
    deletions: Repository<DeletionLog>,
    /// user id -> sequence key of that user's most recent deletion.
    latest_deletion: Repository<String>,
}

impl PrivacyStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            users: Repository::new(store.clone(), "privacy/users/"),
            deletions: Repository::new(store.clone(), "privacy/deletions/"),
            latest_deletion: Repository::new(store, "privacy/latest_deletion/"),
        }
    }

    pub async fn user(&self, user_id: &str) -> Result<Option<UserDataRecord>, StoreError> {
        self.users.get(user_id).await
    }

    /// Adds a file to the user's record, creating the record on first upload.
    pub async fn register_upload(&self, user_id: &str, file: StoredFile) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut record = self.users.get(user_id).await?.unwrap_or_else(|| UserDataRecord {
            user_id: user_id.to_string(),
            files: Vec::new(),
            created_at: now,
            updated_at: now,
        });
        record.files.push(file);
        record.updated_at = now;
        self.users.put(user_id, &record).await
    }

    /// Replaces the user's file list, e.g. with the files that could not be
    /// removed from blob storage.
    pub async fn retain_files(
        &self,
        user_id: &str,
        files: Vec<StoredFile>,
    ) -> Result<(), StoreError> {
        if let Some(mut record) = self.users.get(user_id).await? {
            record.files = files;
            record.updated_at = Utc::now();
            self.users.put(user_id, &record).await?;
        }
        Ok(())
    }

    /// Drops the user record and appends an audit entry. Confirmation ids
    /// count deletions across all users: `del_1`, `del_2`, ...
    pub async fn record_deletion(
        &self,
        user_id: &str,
        files_deleted: usize,
    ) -> Result<DeletionLog, StoreError> {
        let sequence = self.deletions.list("").await?.len() + 1;
        let key = format!("{sequence:08}");
        let log = DeletionLog {
            user_id: user_id.to_string(),
            deleted_at: Utc::now(),
            files_deleted,
            confirmation_id: format!("del_{sequence}"),
        };
        self.deletions.put(&key, &log).await?;
        self.latest_deletion.put(user_id, &key).await?;
        self.users.delete(user_id).await?;
        Ok(log)
    }

    /// The most recent deletion for `user_id`.
    pub async fn deletion(&self, user_id: &str) -> Result<Option<DeletionLog>, StoreError> {
        match self.latest_deletion.get(user_id).await? {
            Some(key) => self.deletions.get(&key).await,
            None => Ok(None),
        }
    }

    /// Every deletion ever recorded, oldest first.
    pub async fn deletion_logs(&self) -> Result<Vec<DeletionLog>, StoreError> {
        self.deletions.list("").await
    }
}
