//! Storage Backends
//!
//! The narrow capability interface the cache client talks to, plus the
//! in-memory and Redis implementations. Backends store opaque bytes; the
//! client owns encoding and the authoritative expiry check.

mod memory;
mod remote;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{BackendKind, CacheConfig};
use crate::error::{CacheError, Result};

pub use self::memory::InMemoryBackend;
pub use self::remote::RedisBackend;

// == Backend Error ==
/// Failure reported by a backend for a single attempt.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Connection could not be made or was lost
    #[error("connection failed: {0}")]
    Connection(String),

    /// The attempt did not finish in time
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with an error that retrying will not fix
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl BackendError {
    /// Whether the failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Connection(_) | BackendError::Timeout(_))
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

// == Storage Backend ==
/// Byte storage keyed by string with optional native TTL.
///
/// Native TTL is an optimization only; the client re-checks expiry on every
/// read. Each method must leave a key either fully written or untouched, even
/// if the returned future is dropped part way.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Stores `value` under `key`, replacing any previous value and TTL.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> BackendResult<()>;

    /// Stores `value` only if `key` holds no live value. Returns whether the
    /// write happened.
    async fn put_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> BackendResult<bool>;

    /// Returns the stored bytes, or None when absent.
    async fn fetch(&self, key: &str) -> BackendResult<Option<Vec<u8>>>;

    /// Removes `key`. Returns whether a live value was removed.
    async fn remove(&self, key: &str) -> BackendResult<bool>;

    /// Health check.
    async fn ping(&self) -> BackendResult<bool>;

    /// Number of stored entries, when the backend can tell cheaply.
    async fn entry_count(&self) -> BackendResult<Option<usize>> {
        Ok(None)
    }

    /// Removes expired entries eagerly. Backends with native expiry return 0.
    fn sweep_expired(&self) -> usize {
        0
    }
}

/// Builds the backend selected by `config`.
///
/// Constructing the Redis backend does not connect; the first operation does.
pub fn build_backend(config: &CacheConfig) -> Result<Arc<dyn StorageBackend>> {
    match config.backend {
        BackendKind::InMemory => Ok(Arc::new(InMemoryBackend::new(config.max_entries))),
        BackendKind::Redis => {
            let backend = RedisBackend::open(&config.redis_url)
                .map_err(|e| CacheError::invalid(format!("bad redis url: {}", e)))?;
            Ok(Arc::new(backend))
        }
    }
}
