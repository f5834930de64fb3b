//! Key-value adapter (SPEC_FULL.md §4.1).
//!
//! Typed operations over Redis: hashes, sets, sorted sets, lists,
//! pipelines, conditional delete-if-value, set-if-absent with TTL. Built on
//! `redis::aio::ConnectionManager`, which auto-reconnects, following the
//! teacher's `cache::redis_client::RedisClient` shape (`with_retry` wrapping
//! every call, a typed `RedisConfig`).

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::errors::StoreError;

/// Compare-and-delete: deletes `KEYS[1]` iff its current value is `ARGV[1]`.
/// Backs `KvStore::delete_if_value` as a single atomic server-side
/// operation (see that method's doc comment for why `WATCH`/`MULTI`/`EXEC`
/// doesn't suffice over a multiplexed connection).
const DELETE_IF_VALUE_SCRIPT_SRC: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

/// The key-value adapter. One instance is shared (via `Arc`) across the
/// order store, the ticket outbox, and anything else that needs raw
/// key-value operations.
pub struct KvStore {
    config: StoreConfig,
    connection: Arc<RwLock<Option<ConnectionManager>>>,
    client: Client,
}

impl KvStore {
    pub async fn connect(config: StoreConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.url.as_str()).map_err(StoreError::Redis)?;
        let store = Self {
            config,
            connection: Arc::new(RwLock::new(None)),
            client,
        };
        store.ensure_connected().await?;
        Ok(store)
    }

    async fn ensure_connected(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.write().await;
        if conn.is_none() {
            tracing::info!(url = %self.config.url, "establishing key-value store connection");
            let manager = ConnectionManager::new(self.client.clone())
                .await
                .map_err(StoreError::Redis)?;
            *conn = Some(manager);
        }
        Ok(())
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        self.ensure_connected().await?;
        let conn = self.connection.read().await;
        conn.clone()
            .ok_or_else(|| StoreError::Redis(RedisError::from((redis::ErrorKind::IoError, "no connection"))))
    }

    async fn with_retry<F, Fut, T>(&self, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: std::future::Future<Output = redis::RedisResult<T>>,
    {
        let mut last_err = None;
        for attempt in 0..self.config.max_retries {
            let conn = self.connection().await?;
            match op(conn).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "key-value store operation failed");
                    last_err = Some(e);
                    if attempt + 1 < self.config.max_retries {
                        let mut conn = self.connection.write().await;
                        *conn = None;
                        tokio::time::sleep(Duration::from_millis(
                            self.config.retry_delay_ms * (attempt as u64 + 1),
                        ))
                        .await;
                    }
                }
            }
        }
        Err(StoreError::Redis(last_err.unwrap_or_else(|| {
            RedisError::from((redis::ErrorKind::IoError, "max retries exceeded"))
        })))
    }

    // ==================== Hash operations ====================

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let (key, field, value) = (key.to_string(), field.to_string(), value.to_string());
        self.with_retry(move |mut conn| {
            let (key, field, value) = (key.clone(), field.clone(), value.clone());
            async move { conn.hset::<_, _, _, ()>(key, field, value).await }
        })
        .await
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let (key, field) = (key.to_string(), field.to_string());
        self.with_retry(move |mut conn| {
            let (key, field) = (key.clone(), field.clone());
            async move { conn.hget(key, field).await }
        })
        .await
    }

    pub async fn hdel(&self, key: &str, field: &str) -> Result<(), StoreError> {
        let (key, field) = (key.to_string(), field.to_string());
        self.with_retry(move |mut conn| {
            let (key, field) = (key.clone(), field.clone());
            async move { conn.hdel::<_, _, ()>(key, field).await }
        })
        .await
    }

    pub async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        let key = key.to_string();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            async move { conn.hgetall(key).await }
        })
        .await
    }

    // ==================== Set operations ====================

    pub async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let (key, member) = (key.to_string(), member.to_string());
        self.with_retry(move |mut conn| {
            let (key, member) = (key.clone(), member.clone());
            async move { conn.sadd::<_, _, ()>(key, member).await }
        })
        .await
    }

    pub async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let (key, member) = (key.to_string(), member.to_string());
        self.with_retry(move |mut conn| {
            let (key, member) = (key.clone(), member.clone());
            async move { conn.srem::<_, _, ()>(key, member).await }
        })
        .await
    }

    // ==================== Sorted set operations ====================

    pub async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let (key, member) = (key.to_string(), member.to_string());
        self.with_retry(move |mut conn| {
            let (key, member) = (key.clone(), member.clone());
            async move { conn.zadd::<_, _, _, ()>(key, member, score).await }
        })
        .await
    }

    pub async fn zrem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let (key, member) = (key.to_string(), member.to_string());
        self.with_retry(move |mut conn| {
            let (key, member) = (key.clone(), member.clone());
            async move { conn.zrem::<_, _, ()>(key, member).await }
        })
        .await
    }

    pub async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        let key = key.to_string();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            async move { conn.zrange(key, start, stop).await }
        })
        .await
    }

    /// `ZINTERSTORE dest numkeys key [key ...] WEIGHTS w [w ...]`. The
    /// matching-candidate algorithm's core primitive (§4.2 step 2).
    pub async fn zinterstore_weighted(
        &self,
        dest: &str,
        keys: &[&str],
        weights: &[f64],
    ) -> Result<(), StoreError> {
        let dest = dest.to_string();
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let weights = weights.to_vec();
        self.with_retry(move |mut conn| {
            let (dest, keys, weights) = (dest.clone(), keys.clone(), weights.clone());
            async move {
                let mut cmd = redis::cmd("ZINTERSTORE");
                cmd.arg(&dest).arg(keys.len()).arg(&keys).arg("WEIGHTS").arg(&weights);
                cmd.query_async::<_, ()>(&mut conn).await
            }
        })
        .await
    }

    /// Copies `src` into `dest` verbatim via an unweighted self-intersection
    /// — used to materialise the mutable "price-eligible" working copy `P`
    /// of `orders:price` (§4.2 step 1) without disturbing the original index.
    pub async fn zinterstore_copy(&self, dest: &str, src: &str) -> Result<(), StoreError> {
        self.zinterstore_weighted(dest, &[src], &[1.0]).await
    }

    pub async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<(), StoreError> {
        let key = key.to_string();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            async move { conn.zrembyscore::<_, _, _, ()>(key, min, max).await }
        })
        .await
    }

    pub async fn delete_key(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            async move { conn.del::<_, ()>(key).await }
        })
        .await
    }

    // ==================== List operations (ticket outbox) ====================

    pub async fn lpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let (key, value) = (key.to_string(), value.to_string());
        self.with_retry(move |mut conn| {
            let (key, value) = (key.clone(), value.clone());
            async move { conn.lpush::<_, _, ()>(key, value).await }
        })
        .await
    }

    pub async fn rpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            async move { conn.rpop(key, None).await }
        })
        .await
    }

    /// Pushes onto the same end `rpop` reads from, so the value becomes the
    /// very next one popped (used to re-enqueue a ticket for immediate retry
    /// rather than sending it to the back behind newer arrivals).
    pub async fn rpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let (key, value) = (key.to_string(), value.to_string());
        self.with_retry(move |mut conn| {
            let (key, value) = (key.clone(), value.clone());
            async move { conn.rpush::<_, _, ()>(key, value).await }
        })
        .await
    }

    // ==================== Conditional operations ====================

    /// `SET key value NX EX ttl_secs` — succeeds only if `key` was absent.
    pub async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let (key, value) = (key.to_string(), value.to_string());
        self.with_retry(move |mut conn| {
            let (key, value) = (key.clone(), value.clone());
            async move {
                redis::cmd("SET")
                    .arg(&key)
                    .arg(&value)
                    .arg("NX")
                    .arg("EX")
                    .arg(ttl_secs)
                    .query_async::<_, Option<String>>(&mut conn)
                    .await
                    .map(|reply| reply.is_some())
            }
        })
        .await
    }

    /// Optimistic delete-if-value: deletes `key` iff its current value is
    /// `expected`, run as a single server-side Lua script rather than
    /// `WATCH`/`GET`/`MULTI`/`EXEC`. Mirrors
    /// `original_source/storage/common.go`'s `deleteWithValue` in intent,
    /// but `WATCH` only guards the connection that issued it, and
    /// `ConnectionManager` multiplexes one physical connection across every
    /// caller — two concurrent `delete_if_value` calls would interleave
    /// their `WATCH`/`EXEC` and the guard would never actually fire.
    /// `EVAL` is one atomic server-side operation regardless of how the
    /// client multiplexes.
    pub async fn delete_if_value(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let (key, expected) = (key.to_string(), expected.to_string());
        self.with_retry(move |mut conn| {
            let (key, expected) = (key.clone(), expected.clone());
            async move {
                let deleted: i64 = redis::Script::new(DELETE_IF_VALUE_SCRIPT_SRC)
                    .key(&key)
                    .arg(&expected)
                    .invoke_async(&mut conn)
                    .await?;
                Ok(deleted > 0)
            }
        })
        .await
    }

    /// Opens a pipeline transaction handle. Mutators buffered on
    /// `StoreTransaction` via its builder methods are flushed atomically by
    /// `exec`.
    pub fn pipeline(&self) -> StoreTransaction<'_> {
        StoreTransaction {
            store: self,
            pipe: redis::pipe(),
        }
    }
}

/// A buffered set of mutations flushed atomically by `exec()`. Mirrors
/// `original_source/storage/common.go`'s `TxContainer` chaining shape.
pub struct StoreTransaction<'a> {
    store: &'a KvStore,
    pipe: redis::Pipeline,
}

impl<'a> StoreTransaction<'a> {
    pub fn zadd(mut self, key: &str, member: &str, score: f64) -> Self {
        self.pipe.atomic().zadd(key, member, score);
        self
    }

    pub fn zrem(mut self, key: &str, member: &str) -> Self {
        self.pipe.atomic().zrem(key, member);
        self
    }

    pub fn sadd(mut self, key: &str, member: &str) -> Self {
        self.pipe.atomic().sadd(key, member);
        self
    }

    pub fn srem(mut self, key: &str, member: &str) -> Self {
        self.pipe.atomic().srem(key, member);
        self
    }

    pub fn hset(mut self, key: &str, field: &str, value: &str) -> Self {
        self.pipe.atomic().hset(key, field, value);
        self
    }

    pub fn hdel(mut self, key: &str, field: &str) -> Self {
        self.pipe.atomic().hdel(key, field);
        self
    }

    pub fn hincrby_float(mut self, key: &str, field: &str, delta: f64) -> Self {
        self.pipe.atomic().hincr(key, field, delta);
        self
    }

    pub async fn exec(self) -> Result<(), StoreError> {
        let pipe = self.pipe;
        let store = self.store;
        store
            .with_retry(move |mut conn| {
                let pipe = pipe.clone();
                async move { pipe.query_async::<_, ()>(&mut conn).await }
            })
            .await
    }
}
