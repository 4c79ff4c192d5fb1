//! BEDA Cache - A TTL-aware cache client
//!
//! Provides get/set/delete/exists/get-or-set over pluggable in-memory and
//! Redis backends, with client-enforced expiry, retries and a small HTTP
//! facade.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod settings;
pub mod tasks;

pub use api::AppState;
pub use backend::{InMemoryBackend, RedisBackend, StorageBackend};
pub use cache::{CacheClient, CacheStats, Codec};
pub use config::{BackendKind, CacheConfig, ServerConfig};
pub use error::{CacheError, Result};
pub use tasks::spawn_sweep_task;
