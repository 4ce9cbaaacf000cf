// src/storage/file.rs

use crate::entry::KeyEntry;
use crate::error::StoreResult;
use crate::storage::traits::{storage_key, STORAGE_KEY_PREFIX};
use crate::storage::KeyStore;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File-backed pool storage: one `api_keys_<service>.json` per service
/// under a single directory.
///
/// Saves write a sibling temp file and rename it into place, so a reader
/// never observes a partially written pool. Service names are used as
/// file name components and must be filesystem-safe.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn pool_path(&self, service: &str) -> PathBuf {
        self.dir.join(format!("{}.json", storage_key(service)))
    }
}

#[async_trait]
impl KeyStore for FileStore {
    async fn load(&self, service: &str) -> StoreResult<Vec<KeyEntry>> {
        let path = self.pool_path(service);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(service, path = %path.display(), "no pool file, empty pool");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Vec<KeyEntry>>(&raw) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                // Corrupt data degrades to an empty pool instead of failing
                // the caller; the entries are unrecoverable either way.
                warn!(
                    service,
                    path = %path.display(),
                    error = %e,
                    "undecodable pool file, treating as empty"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, service: &str, entries: &[KeyEntry]) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.pool_path(service);
        let tmp = path.with_extension("json.tmp");
        let raw = serde_json::to_vec_pretty(entries)?;
        tokio::fs::write(&tmp, &raw).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(service, count = entries.len(), path = %path.display(), "saved pool");
        Ok(())
    }

    async fn remove(&self, service: &str) -> StoreResult<()> {
        let path = self.pool_path(service);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_services(&self) -> StoreResult<Vec<String>> {
        let mut services = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(services),
            Err(e) => return Err(e.into()),
        };

        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(service) = name
                .strip_prefix(STORAGE_KEY_PREFIX)
                .and_then(|rest| rest.strip_suffix(".json"))
            {
                services.push(service.to_string());
            }
        }

        services.sort();
        Ok(services)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn sample_entry(id: &str, service: &str) -> KeyEntry {
        KeyEntry::new(
            id.to_string(),
            format!("secret-{id}"),
            service.to_string(),
            Utc::now(),
            Duration::from_secs(3600),
            100,
            5,
        )
    }

    #[tokio::test]
    async fn load_of_unknown_service_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        assert!(store.load("nowhere").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_pool_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        tokio::fs::write(dir.path().join("api_keys_svc.json"), b"{not json")
            .await
            .unwrap();

        assert!(store.load("svc").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_preserves_order_and_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let entries = vec![sample_entry("a", "svc"), sample_entry("b", "svc")];

        store.save("svc", &entries).await.unwrap();
        let loaded = store.load("svc").await.unwrap();

        assert_eq!(loaded, entries);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.save("svc", &[sample_entry("a", "svc")]).await.unwrap();
        store.remove("svc").await.unwrap();
        store.remove("svc").await.unwrap();

        assert!(store.load("svc").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_services_reflects_saved_pools() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.save("llm-api", &[sample_entry("a", "llm-api")]).await.unwrap();
        store.save("weather-api", &[]).await.unwrap();
        // Unrelated files are ignored.
        tokio::fs::write(dir.path().join("notes.txt"), b"x").await.unwrap();

        let services = store.list_services().await.unwrap();
        assert_eq!(services, vec!["llm-api".to_string(), "weather-api".to_string()]);
    }
}
