use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use talent_api::blob::{BlobStore, MemoryBlobStore, S3BlobStore};
use talent_api::config::Config;
use talent_api::edits::EditStore;
use talent_api::engine::{
    ActivityOptions, Worker, WorkerOptions, WorkflowClient, DEFAULT_PURGE_INTERVAL,
};
use talent_api::llm_client::{LlmClient, TextGenerator};
use talent_api::privacy::PrivacyStore;
use talent_api::research::workflow::ResearchWorkflow;
use talent_api::review::{ReviewSigner, ReviewStore};
use talent_api::routes::build_router;
use talent_api::state::AppState;
use talent_api::store;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("talent_api={}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Talent Promo API v{}", env!("CARGO_PKG_VERSION"));

    // One store backs the engine and the app data
    let (kv, queue) = store::open(config.engine.address.as_deref()).await?;
    if config.engine.address.is_some() {
        info!("Redis store connected");
    }

    let engine = WorkflowClient::new(
        kv.clone(),
        queue,
        &config.engine.namespace,
        config.engine.execution_timeout,
    );
    info!(
        "Workflow client ready (namespace: {}, task queue: {})",
        engine.namespace(),
        config.engine.task_queue
    );

    let blobs: Arc<dyn BlobStore> = match &config.storage.s3 {
        Some(s3) => {
            info!("S3 client initialized (bucket: {})", s3.bucket);
            Arc::new(S3BlobStore::new(s3).await)
        }
        None => {
            warn!("S3_BUCKET not set; uploaded files are kept in memory");
            Arc::new(MemoryBlobStore::new())
        }
    };

    let llm: Option<Arc<dyn TextGenerator>> = match &config.model.api_key {
        Some(_) => {
            let client = LlmClient::new(&config.model)?;
            info!("LLM client initialized (model: {})", client.model());
            Some(Arc::new(client))
        }
        None => {
            warn!("OPENAI_API_KEY not set; research endpoints that call the model are disabled");
            None
        }
    };

    if config.engine.embedded_worker {
        if config.model.api_key.is_some() {
            let generator = Arc::new(LlmClient::new(&config.model)?.with_max_retries(1));
            let worker = build_worker(&config, engine.clone(), generator);
            info!("Embedded worker polling {}", worker.task_queue());
            tokio::spawn(Arc::new(worker).run());
        } else {
            warn!("Embedded worker not started: no model credential");
        }
    }

    let state = AppState {
        engine,
        blobs,
        privacy: PrivacyStore::new(kv.clone()),
        reviews: ReviewStore::new(kv.clone()),
        edits: EditStore::new(kv),
        review_signer: ReviewSigner::from_secret(config.review_secret_key.as_deref()),
        llm,
        config: config.clone(),
    };

    let origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("CORS_ORIGIN is not a valid origin: {}", config.cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_worker(config: &Config, engine: WorkflowClient, generator: Arc<dyn TextGenerator>) -> Worker {
    let options = WorkerOptions {
        task_queue: config.engine.task_queue.clone(),
        max_concurrent_runs: config.engine.worker_concurrency,
        activity_options: ActivityOptions::new(
            config.model.timeout,
            config.engine.activity_max_attempts,
        ),
        retention: config.engine.retention,
        purge_interval: DEFAULT_PURGE_INTERVAL,
    };
    Worker::new(engine, options).register(Arc::new(ResearchWorkflow::new(generator)))
}
