//! Cache Client
//!
//! Uniform get/set/delete/exists contract over any [`StorageBackend`].
//! The client validates arguments, encodes values, wraps them in an
//! expiry-carrying envelope and retries transient backend failures. Expiry
//! is always re-checked on read, whatever the backend does natively.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::backend::{build_backend, BackendResult, StorageBackend};
use crate::cache::{CacheEntry, CacheStats, Codec, EnvelopeHeader, RetryPolicy, StatsRecorder};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

// == Cache Client ==
/// TTL-aware cache client.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct CacheClient {
    backend: Arc<dyn StorageBackend>,
    codec: Codec,
    default_ttl: Option<u64>,
    key_prefix: String,
    retry: RetryPolicy,
    stats: StatsRecorder,
    /// Per-key locks serializing `get_or_set` fills within this process
    fill_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl CacheClient {
    // == Constructors ==
    /// Builds the backend named by `config` and wraps it in a client.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let backend = build_backend(config)?;
        Ok(Self::with_backend(config, backend))
    }

    /// Wraps an existing backend.
    pub fn with_backend(config: &CacheConfig, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            codec: config.codec,
            default_ttl: config.default_ttl,
            key_prefix: config.key_prefix.clone(),
            retry: config.retry_policy(),
            stats: StatsRecorder::new(),
            fill_locks: Arc::new(DashMap::new()),
        }
    }

    /// The backend this client talks to.
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Codec used for writes.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    // == Set ==
    /// Stores `value` under `key`, replacing any existing entry and its TTL.
    ///
    /// # Arguments
    /// * `key` - Non-empty key
    /// * `value` - Any serializable value
    /// * `ttl` - Seconds until expiry; `Some(0)` never expires, `None` uses the
    ///   configured default
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<i64>) -> Result<()> {
        let full_key = self.full_key(key)?;
        let ttl = self.resolve_ttl(ttl)?;
        let bytes = self.encode_entry(value, ttl)?;

        self.call("put", || {
            self.backend.put(&full_key, bytes.clone(), ttl.map(Duration::from_secs))
        })
        .await?;

        self.stats.record_set();
        debug!(key, ttl = ?ttl, "Stored cache entry");
        Ok(())
    }

    // == Get ==
    /// Returns the value stored under `key`, or `None` if it is absent or has
    /// expired.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let full_key = self.full_key(key)?;

        let Some(bytes) = self.call("fetch", || self.backend.fetch(&full_key)).await? else {
            self.stats.record_miss();
            debug!(key, "Cache miss");
            return Ok(None);
        };

        // Reads never write; expired bytes stay until the backend's TTL or
        // sweep reclaims them
        let entry = CacheEntry::from_bytes(&bytes)?;
        if entry.is_expired() {
            self.stats.record_miss();
            debug!(key, "Cache miss (expired)");
            return Ok(None);
        }

        let value = Codec::decode(&entry.value)?;
        self.stats.record_hit();
        debug!(key, "Cache hit");
        Ok(Some(value))
    }

    // == Exists ==
    /// Returns whether `key` holds a live entry. Only the envelope header is
    /// inspected; the payload is never decoded.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let full_key = self.full_key(key)?;

        let live = match self.call("fetch", || self.backend.fetch(&full_key)).await? {
            Some(bytes) => !EnvelopeHeader::parse(&bytes)?.is_expired(),
            None => false,
        };
        debug!(key, live, "Existence check");
        Ok(live)
    }

    // == Delete ==
    /// Removes `key`. Returns whether an entry was actually removed; deleting a
    /// missing key is not an error.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let full_key = self.full_key(key)?;

        let removed = self.call("remove", || self.backend.remove(&full_key)).await?;
        if removed {
            self.stats.record_delete();
        }
        debug!(key, removed, "Deleted cache entry");
        Ok(removed)
    }

    // == Get Or Set ==
    /// Returns the live value under `key`, or computes it with `factory`,
    /// stores it with `ttl` and returns it.
    ///
    /// Callers racing on the same missing key in this process queue on a
    /// per-key lock: the first runs `factory`, the rest read its result. The
    /// write itself is conditional, so a concurrent writer in another process
    /// wins over us and we return its value instead.
    pub async fn get_or_set<T, F, Fut>(&self, key: &str, factory: F, ttl: Option<i64>) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let full_key = self.full_key(key)?;
        let ttl = self.resolve_ttl(ttl)?;

        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        let _fill = self.lock_key(&full_key).await;

        // Another caller may have filled the key while we waited
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        let value = factory().await;
        let bytes = self.encode_entry(&value, ttl)?;
        let expiry = ttl.map(Duration::from_secs);

        let written = self
            .call("put_if_absent", || {
                self.backend.put_if_absent(&full_key, bytes.clone(), expiry)
            })
            .await?;
        if written {
            self.stats.record_set();
            debug!(key, "Filled cache entry");
            return Ok(value);
        }

        if let Some(existing) = self.get(key).await? {
            debug!(key, "Lost fill race, using stored value");
            return Ok(existing);
        }

        // The blocking entry expired between the conditional write and the read
        self.call("put", || self.backend.put(&full_key, bytes.clone(), expiry))
            .await?;
        self.stats.record_set();
        Ok(value)
    }

    // == Ping ==
    /// Checks backend health, retrying like any other call.
    pub async fn ping(&self) -> Result<bool> {
        self.call("ping", || self.backend.ping()).await
    }

    // == Stats ==
    /// Returns a snapshot of the client counters.
    pub async fn stats(&self) -> CacheStats {
        let total_entries = self.backend.entry_count().await.ok().flatten();
        self.stats.snapshot(total_entries)
    }

    // == Sweep ==
    /// Eagerly removes expired entries from backends that need it.
    pub fn sweep_expired(&self) -> usize {
        self.backend.sweep_expired()
    }

    // == Helpers ==
    fn full_key(&self, key: &str) -> Result<String> {
        if key.is_empty() {
            return Err(CacheError::invalid("key must not be empty"));
        }
        Ok(format!("{}{}", self.key_prefix, key))
    }

    /// Maps caller TTL input to whole seconds, None meaning no expiry.
    fn resolve_ttl(&self, ttl: Option<i64>) -> Result<Option<u64>> {
        match ttl {
            None => Ok(self.default_ttl),
            Some(secs) if secs < 0 => Err(CacheError::invalid(format!(
                "ttl must be non-negative, got {}",
                secs
            ))),
            Some(0) => Ok(None),
            Some(secs) => Ok(Some(secs.unsigned_abs())),
        }
    }

    fn encode_entry<T: Serialize + ?Sized>(&self, value: &T, ttl: Option<u64>) -> Result<Vec<u8>> {
        let payload = self.codec.encode(value)?;
        Ok(CacheEntry::new(payload, ttl).to_bytes())
    }

    /// Runs one backend operation under the retry policy and records
    /// retries and failures.
    async fn call<T, F, Fut>(&self, op: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        let mut tries = 0u64;
        let result = self
            .retry
            .run(self.backend.name(), op, || {
                tries += 1;
                attempt()
            })
            .await;

        self.stats.record_retries(tries.saturating_sub(1));
        if result.is_err() {
            self.stats.record_failure();
        }
        result
    }

    async fn lock_key(&self, full_key: &str) -> FillLock {
        let lock = self
            .fill_locks
            .entry(full_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        FillLock {
            guard: Some(lock.lock_owned().await),
            locks: self.fill_locks.clone(),
            key: full_key.to_string(),
        }
    }
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("backend", &self.backend.name())
            .field("codec", &self.codec)
            .field("default_ttl", &self.default_ttl)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

// == Fill Lock ==
/// Held while filling a key. Dropping it releases the lock and forgets the
/// per-key mutex once nobody else holds it.
struct FillLock {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    key: String,
}

impl Drop for FillLock {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
