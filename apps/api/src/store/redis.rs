use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::info;

use super::{KeyValueStore, StoreError, TaskQueue};

const SCAN_BATCH: usize = 200;

/// Redis-backed store. Plain keys hold JSON documents, lists hold queues.
pub struct RedisStore {
    conn: MultiplexedConnection,
    /// BRPOP parks the connection it runs on, so queue waits get their own.
    blocking: Mutex<MultiplexedConnection>,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        info!("Connecting to Redis...");
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        let blocking = client.get_multiplexed_tokio_connection().await?;
        info!("Redis connection established");
        Ok(Self {
            conn,
            blocking: Mutex::new(blocking),
        })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", escape_glob(prefix));

        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            // Keys can vanish between SCAN and GET; skip those.
            let value: Option<String> = conn.get(&key).await?;
            if let Some(value) = value {
                entries.push((key, value));
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl TaskQueue for RedisStore {
    async fn enqueue(&self, queue: &str, item: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(queue_key(queue), item).await?;
        Ok(())
    }

    async fn dequeue(&self, queue: &str, wait: Duration) -> Result<Option<String>, StoreError> {
        let mut conn = self.blocking.lock().await;
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(queue_key(queue))
            .arg(wait.as_secs().max(1))
            .query_async(&mut *conn)
            .await?;
        Ok(popped.map(|(_, item)| item))
    }
}

fn queue_key(queue: &str) -> String {
    format!("queues/{queue}")
}

/// Escapes Redis glob metacharacters so a prefix matches literally.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
