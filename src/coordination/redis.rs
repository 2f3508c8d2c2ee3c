//! Redis-backed [`CoordinationStore`]

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};

use super::{CoordinationError, CoordinationStore};

pub struct RedisCoordinationStore {
    /// Multiplexed connection, reconnects on its own
    manager: ConnectionManager,
    /// Key prefix shared by every instance of this service, e.g. "loanflow:"
    namespace: String,
}

impl RedisCoordinationStore {
    /// Connect to `url` (e.g. "redis://localhost:6379") and scope all keys under `namespace`.
    pub async fn connect(url: &str, namespace: &str) -> Result<Self, CoordinationError> {
        let client =
            Client::open(url).map_err(|e| CoordinationError::ConnectionError(e.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| CoordinationError::ConnectionError(e.to_string()))?;

        tracing::info!(namespace = %namespace, "Coordination store connected");

        Ok(Self {
            manager,
            namespace: format!("{}:", namespace),
        })
    }

    fn prefixed_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PX rejects 0
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        let mut conn = self.manager.clone();

        // SET key value NX PX ttl replies OK on write and nil when the key exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.prefixed_key(key))
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, CoordinationError> {
        let mut conn = self.manager.clone();
        let exists: bool = conn.exists(self.prefixed_key(key)).await?;
        Ok(exists)
    }

    async fn delete(&self, key: &str) -> Result<(), CoordinationError> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.del(self.prefixed_key(key)).await?;
        Ok(())
    }

    async fn set_cache(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CoordinationError> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("SET")
            .arg(self.prefixed_key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_cache(&self, key: &str) -> Result<Option<String>, CoordinationError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(self.prefixed_key(key)).await?;
        Ok(value)
    }

    async fn ping(&self) -> Result<(), CoordinationError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
