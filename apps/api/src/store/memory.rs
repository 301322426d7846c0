use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, RwLock};

use super::{KeyValueStore, StoreError, TaskQueue};

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    queue_signal: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[async_trait]
impl TaskQueue for MemoryStore {
    async fn enqueue(&self, queue: &str, item: &str) -> Result<(), StoreError> {
        self.queues
            .lock()
            .await
            .entry(queue.to_string())
            .or_default()
            .push_back(item.to_string());
        self.queue_signal.notify_waiters();
        Ok(())
    }

    async fn dequeue(&self, queue: &str, wait: Duration) -> Result<Option<String>, StoreError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            // Register interest before checking so an enqueue between the check
            // and the wait is not missed.
            let notified = self.queue_signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self
                .queues
                .lock()
                .await
                .get_mut(queue)
                .and_then(|q| q.pop_front())
            {
                return Ok(Some(item));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }
}
