//! Redis state store for `tierlimit` (companion crate).
//! Bring your own `redis::aio::ConnectionManager`; counters are stored as JSON strings with a
//! millisecond expiry.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tierlimit::StateStore;

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    namespace: Option<String>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("namespace", &self.namespace)
            .field("conn", &"<redis::aio::ConnectionManager>")
            .finish()
    }
}

impl RedisStore {
    /// Store backed by an existing connection manager; keys are used as given.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn, namespace: None }
    }

    /// Connect to `url` and build a store.
    ///
    /// # Errors
    /// Returns the client error if the URL is invalid or the first connection fails.
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }

    /// Prefix every key with `namespace:` so several deployments can share one database.
    ///
    /// Empty or whitespace-only namespaces are ignored.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let ns: String = namespace.into();
        let ns = ns.trim().trim_end_matches(':').to_string();
        self.namespace = if ns.is_empty() { None } else { Some(ns) };
        self
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn full_key(&self, key: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}:{key}"),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl StateStore for RedisStore {
    type Error = redis::RedisError;

    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        let mut conn = self.conn.clone();
        conn.get(self.full_key(key)).await
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), Self::Error> {
        let mut conn = self.conn.clone();
        let key = self.full_key(key);
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);

        // PX rejects zero; an already-expired window is simply dropped.
        if millis == 0 {
            tracing::trace!(target: "tierlimit::redis", key = %key, "zero expiry; deleting key");
            let _: () = conn.del(&key).await?;
            return Ok(());
        }

        let _: () = redis::cmd("SET")
            .arg(&key)
            .arg(value)
            .arg("PX")
            .arg(millis)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::warn!(target: "tierlimit::redis", key = %key, error = %e, "failed to write limiter state");
                e
            })?;
        Ok(())
    }
}
