// src/storage/memory.rs

use crate::entry::KeyEntry;
use crate::error::StoreResult;
use crate::storage::KeyStore;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::trace;

/// In-memory pool storage for tests and embedded use.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    pools: RwLock<HashMap<String, Vec<KeyEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for InMemoryStore {
    async fn load(&self, service: &str) -> StoreResult<Vec<KeyEntry>> {
        trace!(service, "InMemoryStore::load");
        let pools = self.pools.read().await;
        Ok(pools.get(service).cloned().unwrap_or_default())
    }

    async fn save(&self, service: &str, entries: &[KeyEntry]) -> StoreResult<()> {
        trace!(service, count = entries.len(), "InMemoryStore::save");
        let mut pools = self.pools.write().await;
        pools.insert(service.to_string(), entries.to_vec());
        Ok(())
    }

    async fn remove(&self, service: &str) -> StoreResult<()> {
        trace!(service, "InMemoryStore::remove");
        let mut pools = self.pools.write().await;
        pools.remove(service);
        Ok(())
    }

    async fn list_services(&self) -> StoreResult<Vec<String>> {
        let pools = self.pools.read().await;
        let mut services: Vec<String> = pools.keys().cloned().collect();
        services.sort();
        Ok(services)
    }
}
