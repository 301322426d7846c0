//! Per-run state of the interactive edit review: user edits, resolved
//! suggestions, approval.

pub mod handlers;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{KeyValueStore, Repository, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditRunStatus {
    Waiting,
    Validating,
    Processing,
    Approved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditRunState {
    pub run_id: String,
    pub status: EditRunStatus,
    /// Edits are opaque to the server and kept in submission order.
    pub edits: Vec<Value>,
    pub suggestions_resolved: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EditRunState {
    fn new(run_id: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.to_string(),
            status: EditRunStatus::Waiting,
            edits: Vec::new(),
            suggestions_resolved: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone)]
pub struct EditStore {
    runs: Repository<EditRunState>,
}

impl EditStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            runs: Repository::new(store, "edits/runs/"),
        }
    }

    pub async fn run(&self, run_id: &str) -> Result<Option<EditRunState>, StoreError> {
        self.runs.get(run_id).await
    }

    /// Appends edits, creating the run on first submission, and moves it to
    /// `validating`.
    pub async fn submit_edits(
        &self,
        run_id: &str,
        edits: Vec<Value>,
    ) -> Result<EditRunState, StoreError> {
        let mut run = self
            .runs
            .get(run_id)
            .await?
            .unwrap_or_else(|| EditRunState::new(run_id));
        run.edits.extend(edits);
        run.status = EditRunStatus::Validating;
        run.updated_at = Utc::now();
        self.runs.put(run_id, &run).await?;
        Ok(run)
    }

    /// `None` when the run does not exist.
    pub async fn resolve_suggestions(
        &self,
        run_id: &str,
        suggestion_ids: Vec<String>,
    ) -> Result<Option<EditRunState>, StoreError> {
        self.update(run_id, |run| {
            run.suggestions_resolved.extend(suggestion_ids);
            run.status = EditRunStatus::Processing;
        })
        .await
    }

    /// `None` when the run does not exist.
    pub async fn approve(&self, run_id: &str) -> Result<Option<EditRunState>, StoreError> {
        self.update(run_id, |run| run.status = EditRunStatus::Approved)
            .await
    }

    async fn update(
        &self,
        run_id: &str,
        apply: impl FnOnce(&mut EditRunState),
    ) -> Result<Option<EditRunState>, StoreError> {
        let Some(mut run) = self.runs.get(run_id).await? else {
            return Ok(None);
        };
        apply(&mut run);
        run.updated_at = Utc::now();
        self.runs.put(run_id, &run).await?;
        Ok(Some(run))
    }
}
