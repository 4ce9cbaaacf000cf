// src/storage/traits.rs

use crate::entry::KeyEntry;
use crate::error::StoreResult;
use async_trait::async_trait;

/// Prefix shared by every persisted pool key.
pub const STORAGE_KEY_PREFIX: &str = "api_keys_";

/// Storage key under which a service's pool is persisted.
pub fn storage_key(service: &str) -> String {
    format!("{STORAGE_KEY_PREFIX}{service}")
}

/// Trait for key pool persistence, one ordered pool per service name.
///
/// Pool order is selection priority and must survive a save/load round
/// trip. Implementations treat missing or undecodable data as an empty
/// pool rather than an error; only genuine IO failures surface as `Err`.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Load the full pool for a service. Empty if the service is unknown.
    async fn load(&self, service: &str) -> StoreResult<Vec<KeyEntry>>;

    /// Overwrite the full pool. A partially written pool must never be
    /// observable by a concurrent or subsequent load.
    async fn save(&self, service: &str, entries: &[KeyEntry]) -> StoreResult<()>;

    /// Drop the pool for a service. Removing an unknown service is a no-op.
    async fn remove(&self, service: &str) -> StoreResult<()>;

    /// Service names derived from the pool keys present in the store.
    async fn list_services(&self) -> StoreResult<Vec<String>>;
}
