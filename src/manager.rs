// src/manager.rs

use crate::clock::{Clock, SystemClock};
use crate::config::RotationDefaults;
use crate::entry::KeyEntry;
use crate::storage::KeyStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// A service's cached pool. `None` means not loaded from the store yet.
/// The mutex serializes the whole load-modify-save sequence for one
/// service, so concurrent callers never lose a counter update; separate
/// services never contend.
type PoolSlot = Arc<Mutex<Option<Vec<KeyEntry>>>>;

/// Per-key overrides for [`RotationManager::register_key`]. Unset fields
/// fall back to the manager's [`RotationDefaults`].
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    pub key_id: Option<String>,
    pub rotation_interval: Option<Duration>,
    pub max_usage_count: Option<u64>,
    pub max_failure_count: Option<u32>,
}

/// Pool health summary. Entry lines never contain secrets.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RotationStatus {
    pub service: String,
    pub total_keys: usize,
    /// Entries that are active and currently selectable.
    pub active_keys: usize,
    pub keys_needing_rotation: usize,
    pub entries: Vec<String>,
}

/// Owns the credential pools for all services: registration, selection,
/// success/failure accounting, and rotation.
///
/// Every operation degrades rather than fails: store errors are logged
/// and the result is "no credential available" or a retained in-memory
/// state, never a panic or an error across this boundary. Callers treat
/// a missing key as a recoverable configuration problem.
pub struct RotationManager {
    store: Arc<dyn KeyStore>,
    clock: Arc<dyn Clock>,
    defaults: RotationDefaults,
    pools: DashMap<String, PoolSlot>,
}

impl RotationManager {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self::with_parts(store, Arc::new(SystemClock), RotationDefaults::default())
    }

    pub fn with_clock(store: Arc<dyn KeyStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_parts(store, clock, RotationDefaults::default())
    }

    pub fn with_parts(
        store: Arc<dyn KeyStore>,
        clock: Arc<dyn Clock>,
        defaults: RotationDefaults,
    ) -> Self {
        Self {
            store,
            clock,
            defaults,
            pools: DashMap::new(),
        }
    }

    fn slot(&self, service: &str) -> PoolSlot {
        self.pools.entry(service.to_string()).or_default().clone()
    }

    /// Fills the slot from the store on first touch. A failed load is
    /// logged and degrades to an empty pool.
    async fn load_into<'a>(
        &self,
        service: &str,
        slot: &'a mut Option<Vec<KeyEntry>>,
    ) -> &'a mut Vec<KeyEntry> {
        if slot.is_none() {
            let loaded = match self.store.load(service).await {
                Ok(entries) => entries,
                Err(e) => {
                    error!(service, error = %e, "failed to load key pool, degrading to empty");
                    Vec::new()
                }
            };
            *slot = Some(loaded);
        }
        slot.get_or_insert_with(Vec::new)
    }

    /// A failed save is logged; the cached pool stays authoritative for
    /// this process so counters keep advancing.
    async fn persist(&self, service: &str, entries: &[KeyEntry]) {
        if let Err(e) = self.store.save(service, entries).await {
            error!(service, error = %e, "failed to persist key pool, in-memory state retained");
        }
    }

    /// Registers a new active key at the end of the service's pool.
    ///
    /// Pool order is selection priority, so existing keys keep precedence
    /// over the new one. A missing `key_id` is generated from the service
    /// name, the current timestamp, and a random suffix.
    #[instrument(skip(self, secret, options), fields(service = service))]
    pub async fn register_key(
        &self,
        service: &str,
        secret: impl Into<String>,
        options: RegisterOptions,
    ) -> KeyEntry {
        let slot = self.slot(service);
        let mut guard = slot.lock().await;
        let pool = self.load_into(service, &mut guard).await;

        let now = self.clock.now();
        let key_id = options
            .key_id
            .unwrap_or_else(|| generate_key_id(service, now));
        if pool.iter().any(|entry| entry.key_id == key_id) {
            warn!(service, key_id = %key_id, "key id already present in pool, outcome reports will hit the oldest entry");
        }
        let entry = KeyEntry::new(
            key_id,
            secret.into(),
            service.to_string(),
            now,
            options
                .rotation_interval
                .unwrap_or_else(|| self.defaults.rotation_interval()),
            options.max_usage_count.unwrap_or(self.defaults.max_usage_count),
            options
                .max_failure_count
                .unwrap_or(self.defaults.max_failure_count),
        );

        pool.push(entry.clone());
        self.persist(service, pool).await;
        info!(
            service,
            key_id = %entry.key_id,
            pool_size = pool.len(),
            "registered API key"
        );
        entry
    }

    /// Returns the secret of the first valid key in stored order, marking
    /// it used and persisting before the secret is handed out.
    ///
    /// Selection is deterministic priority order, not round-robin: the
    /// oldest registered valid key wins until it stops being valid. `None`
    /// means "no credential available" and is a normal outcome, not an
    /// error; no store write happens in that case.
    #[instrument(skip(self), fields(service = service))]
    pub async fn get_active_key(&self, service: &str) -> Option<String> {
        let slot = self.slot(service);
        let mut guard = slot.lock().await;
        let pool = self.load_into(service, &mut guard).await;

        let now = self.clock.now();
        let Some(index) = pool.iter().position(|entry| entry.is_valid(now)) else {
            debug!(service, pool_size = pool.len(), "no valid key available");
            return None;
        };

        let updated = pool[index].mark_used(now);
        let secret = updated.secret.clone();
        debug!(
            service,
            key_id = %updated.key_id,
            usage = updated.usage_count,
            secret.preview = %preview(&secret),
            "selected API key"
        );
        pool[index] = updated;
        self.persist(service, pool).await;
        Some(secret)
    }

    /// Reports a successful use of `key_id`.
    ///
    /// Usage was already counted when [`get_active_key`](Self::get_active_key)
    /// handed the key out, so this refreshes `last_used_at` without a
    /// second increment: one logical use costs exactly one count against
    /// `max_usage_count`. An unknown id is logged and ignored.
    #[instrument(skip(self), fields(service = service, key_id = key_id))]
    pub async fn record_success(&self, service: &str, key_id: &str) {
        let slot = self.slot(service);
        let mut guard = slot.lock().await;
        let pool = self.load_into(service, &mut guard).await;

        let now = self.clock.now();
        match pool.iter().position(|entry| entry.key_id == key_id) {
            Some(index) => {
                pool[index] = pool[index].touch(now);
                self.persist(service, pool).await;
                debug!(service, key_id, "recorded success");
            }
            None => {
                warn!(service, key_id, "success reported for unknown key id, ignoring");
            }
        }
    }

    /// Reports a failed use of `key_id`. With `deactivate_if_exhausted`,
    /// the key is deactivated once its failure cap is reached. An unknown
    /// id is logged and ignored.
    #[instrument(skip(self), fields(service = service, key_id = key_id, deactivate_if_exhausted))]
    pub async fn record_failure(
        &self,
        service: &str,
        key_id: &str,
        deactivate_if_exhausted: bool,
    ) {
        let slot = self.slot(service);
        let mut guard = slot.lock().await;
        let pool = self.load_into(service, &mut guard).await;

        let now = self.clock.now();
        match pool.iter().position(|entry| entry.key_id == key_id) {
            Some(index) => {
                let mut updated = pool[index].mark_failed(now);
                if deactivate_if_exhausted && updated.failure_count >= updated.max_failure_count {
                    updated = updated.deactivate();
                    warn!(
                        service,
                        key_id,
                        failures = updated.failure_count,
                        "failure cap reached, key deactivated"
                    );
                }
                pool[index] = updated;
                self.persist(service, pool).await;
            }
            None => {
                warn!(service, key_id, "failure reported for unknown key id, ignoring");
            }
        }
    }

    /// One rotation pass: deactivates every active key that is due for
    /// rotation, appends a fresh default-limit key per replacement secret,
    /// persists, and returns the deactivated key ids.
    #[instrument(skip(self, new_secrets), fields(service = service, replacements = new_secrets.len()))]
    pub async fn rotate_keys(&self, service: &str, new_secrets: &[String]) -> Vec<String> {
        let slot = self.slot(service);
        let mut guard = slot.lock().await;
        let pool = self.load_into(service, &mut guard).await;

        let now = self.clock.now();
        let mut deactivated = Vec::new();
        for entry in pool.iter_mut() {
            if entry.active && entry.needs_rotation(now) {
                *entry = entry.deactivate();
                deactivated.push(entry.key_id.clone());
            }
        }

        for secret in new_secrets {
            pool.push(KeyEntry::new(
                generate_key_id(service, now),
                secret.clone(),
                service.to_string(),
                now,
                self.defaults.rotation_interval(),
                self.defaults.max_usage_count,
                self.defaults.max_failure_count,
            ));
        }

        self.persist(service, pool).await;
        info!(
            service,
            deactivated = deactivated.len(),
            added = new_secrets.len(),
            pool_size = pool.len(),
            "rotation pass completed"
        );
        deactivated
    }

    /// True when any key in the pool is due for rotation.
    pub async fn needs_rotation(&self, service: &str) -> bool {
        let slot = self.slot(service);
        let mut guard = slot.lock().await;
        let pool = self.load_into(service, &mut guard).await;

        let now = self.clock.now();
        pool.iter().any(|entry| entry.needs_rotation(now))
    }

    /// Counts plus one redacted summary line per entry.
    pub async fn rotation_status(&self, service: &str) -> RotationStatus {
        let slot = self.slot(service);
        let mut guard = slot.lock().await;
        let pool = self.load_into(service, &mut guard).await;

        let now = self.clock.now();
        RotationStatus {
            service: service.to_string(),
            total_keys: pool.len(),
            active_keys: pool
                .iter()
                .filter(|entry| entry.active && entry.is_valid(now))
                .count(),
            keys_needing_rotation: pool.iter().filter(|entry| entry.needs_rotation(now)).count(),
            entries: pool.iter().map(|entry| entry.summary_line(now)).collect(),
        }
    }

    /// Service names known to the store. Falls back to the cached names
    /// when the store cannot be listed.
    pub async fn all_services(&self) -> Vec<String> {
        match self.store.list_services().await {
            Ok(services) => services,
            Err(e) => {
                error!(error = %e, "failed to list services, falling back to cached names");
                let mut names: Vec<String> =
                    self.pools.iter().map(|slot| slot.key().clone()).collect();
                names.sort();
                names
            }
        }
    }

    /// Drops a service's pool from cache and store.
    #[instrument(skip(self), fields(service = service))]
    pub async fn clear_keys(&self, service: &str) {
        let slot = self.slot(service);
        let mut guard = slot.lock().await;
        if let Err(e) = self.store.remove(service).await {
            error!(service, error = %e, "failed to remove key pool from store");
        }
        *guard = Some(Vec::new());
        info!(service, "cleared key pool");
    }

    /// Drops every pool, cached or persisted.
    pub async fn clear_all_keys(&self) {
        let mut services = self.all_services().await;
        for slot in self.pools.iter() {
            if !services.contains(slot.key()) {
                services.push(slot.key().clone());
            }
        }
        for service in services {
            self.clear_keys(&service).await;
        }
    }

    /// Recovers the key id for a secret previously returned by
    /// [`get_active_key`](Self::get_active_key). The secret is the only
    /// artifact callers hold, so the rotating-call wrapper matches on it.
    pub(crate) async fn key_id_for_secret(&self, service: &str, secret: &str) -> Option<String> {
        let slot = self.slot(service);
        let mut guard = slot.lock().await;
        let pool = self.load_into(service, &mut guard).await;
        pool.iter()
            .find(|entry| entry.secret == secret)
            .map(|entry| entry.key_id.clone())
    }
}

fn generate_key_id(service: &str, now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", service, now.timestamp_millis(), &suffix[..8])
}

/// Redacted secret for log output, as "abcd...wxyz". Counts characters,
/// not bytes, so multi-byte secrets never split mid-character.
pub(crate) fn preview(secret: &str) -> String {
    let length = secret.chars().count();
    if length > 8 {
        let head: String = secret.chars().take(4).collect();
        let tail: String = secret.chars().skip(length - 4).collect();
        format!("{head}...{tail}")
    } else {
        secret.to_string()
    }
}
