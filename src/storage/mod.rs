// src/storage/mod.rs

pub mod file;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod traits;

pub use file::FileStore;
pub use memory::InMemoryStore;
#[cfg(feature = "redis")]
pub use redis::RedisStore;
pub use traits::{storage_key, KeyStore, STORAGE_KEY_PREFIX};
