// src/lib.rs

//! Credential rotation manager.
//!
//! Owns pools of API credentials per external service, decides which
//! credential is currently usable, tracks usage and failure counters, and
//! retires or replaces credentials by age, usage, and failure policy.
//! Persistence is pluggable through [`KeyStore`]; callers own their own
//! transport and report outcomes back via [`RotationManager::record_success`]
//! and [`RotationManager::record_failure`], or use the
//! [`RotationManager::with_rotating_key`] wrapper to do both in one call.
//!
//! Secrets are persisted in plain serialized form; encrypting the backing
//! store is the deployment's concern, not this crate's.

pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod manager;
pub mod rotating;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RotationDefaults;
pub use entry::KeyEntry;
pub use error::{ConfigError, StoreError, StoreResult};
pub use manager::{RegisterOptions, RotationManager, RotationStatus};
pub use rotating::CallOutcome;
#[cfg(feature = "redis")]
pub use storage::RedisStore;
pub use storage::{FileStore, InMemoryStore, KeyStore};
