use std::sync::Arc;

use crate::blob::BlobStore;
use crate::config::Config;
use crate::edits::EditStore;
use crate::engine::WorkflowClient;
use crate::llm_client::TextGenerator;
use crate::privacy::PrivacyStore;
use crate::review::{ReviewSigner, ReviewStore};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Engine connection, created once at startup.
    pub engine: WorkflowClient,
    pub blobs: Arc<dyn BlobStore>,
    pub privacy: PrivacyStore,
    pub reviews: ReviewStore,
    pub edits: EditStore,
    pub review_signer: ReviewSigner,
    /// Model client for the synchronous research endpoint. `None` when no
    /// credential is configured.
    pub llm: Option<Arc<dyn TextGenerator>>,
}
