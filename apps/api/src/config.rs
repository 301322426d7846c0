use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_MODEL: &str = "gpt-5-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Application configuration loaded from environment variables.
/// Built once at startup and threaded explicitly into every component.
#[derive(Debug, Clone)]
pub struct Config {
    pub model: ModelConfig,
    pub engine: EngineConfig,
    pub storage: StorageConfig,
    pub review_secret_key: Option<String>,
    pub review_base_url: String,
    pub cors_origin: String,
    pub port: u16,
    pub rust_log: String,
}

/// Everything the model client needs. The credential is optional so the API
/// process can start without it when it only submits and polls workflows.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Redis URL. `None` runs the engine on the in-memory store.
    pub address: Option<String>,
    pub namespace: String,
    pub task_queue: String,
    pub retention: Duration,
    pub execution_timeout: Duration,
    pub activity_max_attempts: u32,
    pub worker_concurrency: usize,
    pub embedded_worker: bool,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub s3: Option<S3Config>,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let engine_address = optional_env("ENGINE_ADDRESS");
        let embedded_default = engine_address.is_none();

        Ok(Config {
            model: ModelConfig {
                api_key: optional_env("OPENAI_API_KEY"),
                model: optional_env("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                base_url: optional_env("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
                timeout: Duration::from_secs(parse_env("OPENAI_TIMEOUT", 60u64)?),
            },
            engine: EngineConfig {
                address: engine_address,
                namespace: optional_env("ENGINE_NAMESPACE").unwrap_or_else(|| "default".into()),
                task_queue: optional_env("ENGINE_TASK_QUEUE")
                    .unwrap_or_else(|| "research-queue".into()),
                retention: Duration::from_secs(
                    parse_env("ENGINE_RETENTION_HOURS", 72u64)? * 3600,
                ),
                execution_timeout: Duration::from_secs(parse_env(
                    "WORKFLOW_EXECUTION_TIMEOUT",
                    600u64,
                )?),
                activity_max_attempts: parse_env("ACTIVITY_MAX_ATTEMPTS", 3u32)?,
                worker_concurrency: parse_env("WORKER_CONCURRENCY", 4usize)?,
                embedded_worker: parse_env("EMBEDDED_WORKER", embedded_default)?,
            },
            storage: StorageConfig {
                s3: load_s3_config()?,
            },
            review_secret_key: optional_env("REVIEW_SECRET_KEY"),
            review_base_url: optional_env("REVIEW_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            cors_origin: optional_env("CORS_ORIGIN")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            port: parse_env("PORT", 8080u16)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

impl ModelConfig {
    /// Returns the credential or fails; only processes that call the model need it.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .context("Required environment variable 'OPENAI_API_KEY' is not set")
    }
}

/// S3 is all-or-nothing: a bucket without credentials is a configuration error.
fn load_s3_config() -> Result<Option<S3Config>> {
    let Some(bucket) = optional_env("S3_BUCKET") else {
        return Ok(None);
    };
    Ok(Some(S3Config {
        bucket,
        endpoint: require_env("S3_ENDPOINT")?,
        access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
        secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
    }))
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        None => Ok(default),
    }
}
