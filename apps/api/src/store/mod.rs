//! Keyed storage behind a small repository interface.
//!
//! Every piece of server-side state (workflow records, privacy records,
//! review links and comments) lives behind `KeyValueStore`. Production runs on
//! Redis; tests and local development run on `MemoryStore`.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Returns `true` if the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// All entries whose key starts with `prefix`, ordered by key.
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError>;
}

/// FIFO work queue used by the workflow engine to hand runs to workers.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, queue: &str, item: &str) -> Result<(), StoreError>;

    /// Waits up to `wait` for an item. `None` means the wait elapsed.
    async fn dequeue(&self, queue: &str, wait: Duration) -> Result<Option<String>, StoreError>;
}

/// Opens the shared store: Redis when an address is given, otherwise a
/// process-local memory store. Both halves point at the same backend.
pub async fn open(
    address: Option<&str>,
) -> Result<(Arc<dyn KeyValueStore>, Arc<dyn TaskQueue>), StoreError> {
    match address {
        Some(address) => {
            let redis = Arc::new(RedisStore::connect(address).await?);
            Ok((redis.clone(), redis))
        }
        None => {
            info!("No store address configured; state lives in memory and does not survive restarts");
            let memory = Arc::new(MemoryStore::new());
            Ok((memory.clone(), memory))
        }
    }
}

/// Typed view over a `KeyValueStore`: JSON values under a fixed key prefix.
pub struct Repository<T> {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            prefix: self.prefix.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Repository<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            _marker: PhantomData,
        }
    }

    fn key(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        match self.store.get(&self.key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn put(&self, id: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.store.put(&self.key(id), raw).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.store.delete(&self.key(id)).await
    }

    /// Lists values whose id starts with `id_prefix` (relative to the repository prefix).
    pub async fn list(&self, id_prefix: &str) -> Result<Vec<T>, StoreError> {
        self.store
            .list_by_prefix(&self.key(id_prefix))
            .await?
            .into_iter()
            .map(|(_, raw)| serde_json::from_str(&raw).map_err(StoreError::from))
            .collect()
    }

    /// Like `list`, but entries that no longer decode are logged and skipped.
    pub async fn list_decodable(&self, id_prefix: &str) -> Result<Vec<T>, StoreError> {
        let entries = self.store.list_by_prefix(&self.key(id_prefix)).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, raw)| match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Skipping undecodable entry {key}: {e}");
                    None
                }
            })
            .collect())
    }
}
