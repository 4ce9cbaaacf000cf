// src/storage/redis.rs

use crate::entry::KeyEntry;
use crate::error::StoreResult;
use crate::storage::traits::{storage_key, STORAGE_KEY_PREFIX};
use crate::storage::KeyStore;
use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use tracing::{debug, warn};

/// Redis-backed pool storage: one JSON blob per service under
/// `<prefix>api_keys_<service>`.
pub struct RedisStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisStore {
    pub fn new(pool: Pool) -> Self {
        Self::with_prefix(pool, "keyrotor:")
    }

    /// The prefix namespaces this store's keys within a shared Redis.
    pub fn with_prefix(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
        }
    }

    fn blob_key(&self, service: &str) -> String {
        format!("{}{}", self.key_prefix, storage_key(service))
    }
}

#[async_trait]
impl KeyStore for RedisStore {
    async fn load(&self, service: &str) -> StoreResult<Vec<KeyEntry>> {
        let mut conn = self.pool.get().await?;
        let raw: Option<String> = conn.get(self.blob_key(service)).await?;
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<KeyEntry>>(&raw) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(service, error = %e, "undecodable pool blob in Redis, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, service: &str, entries: &[KeyEntry]) -> StoreResult<()> {
        let raw = serde_json::to_string(entries)?;
        let mut conn = self.pool.get().await?;
        let _: () = conn.set(self.blob_key(service), raw).await?;
        debug!(service, count = entries.len(), "saved pool to Redis");
        Ok(())
    }

    async fn remove(&self, service: &str) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.del(self.blob_key(service)).await?;
        Ok(())
    }

    async fn list_services(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let pattern = format!("{}{}*", self.key_prefix, STORAGE_KEY_PREFIX);
        let keys: Vec<String> = conn.keys(pattern).await?;

        let strip = format!("{}{}", self.key_prefix, STORAGE_KEY_PREFIX);
        let mut services: Vec<String> = keys
            .iter()
            .filter_map(|key| key.strip_prefix(strip.as_str()))
            .map(str::to_string)
            .collect();
        services.sort();
        Ok(services)
    }
}
