//! In-Memory Backend
//!
//! Sharded concurrent map with a min-heap of expiration times for the eager
//! sweep. Expiry is also checked lazily on every access, so the sweep only
//! bounds memory and is never needed for correctness.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::{BackendResult, StorageBackend};
use crate::cache::current_timestamp_ms;

// == Slot ==
/// A stored value with its native expiry.
#[derive(Debug)]
struct Slot {
    value: Vec<u8>,
    /// Unix milliseconds, None = no expiration
    expires_at: Option<u64>,
    /// Logical access tick used for eviction order
    last_access: AtomicU64,
}

impl Slot {
    fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(expires) if now >= expires)
    }
}

// == In-Memory Backend ==
/// Process-local storage backend.
#[derive(Debug)]
pub struct InMemoryBackend {
    entries: DashMap<String, Slot>,
    /// (expires_at, key) pairs, earliest first. May hold stale pairs for keys
    /// that were overwritten or deleted; the sweep skips those.
    expirations: Mutex<BinaryHeap<Reverse<(u64, String)>>>,
    max_entries: Option<usize>,
    access_clock: AtomicU64,
    evictions: AtomicU64,
}

impl InMemoryBackend {
    /// Creates an empty backend, optionally bounded to `max_entries`.
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            entries: DashMap::new(),
            expirations: Mutex::new(BinaryHeap::new()),
            max_entries,
            access_clock: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Number of entries evicted to respect `max_entries`.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Number of stored entries, expired-but-unswept ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn tick(&self) -> u64 {
        self.access_clock.fetch_add(1, Ordering::Relaxed)
    }

    fn slot(&self, value: Vec<u8>, ttl: Option<Duration>, now: u64) -> Slot {
        let expires_at = ttl.map(|ttl| {
            let ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
            now.saturating_add(ms.max(1))
        });
        Slot {
            value,
            expires_at,
            last_access: AtomicU64::new(self.tick()),
        }
    }

    fn schedule(&self, expires_at: Option<u64>, key: &str) {
        if let Some(expires_at) = expires_at {
            self.expirations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Reverse((expires_at, key.to_string())));
        }
    }

    /// Trims the map back to `max_entries` after `keep` was inserted.
    ///
    /// The bound is enforced after each write rather than reserved before
    /// it: concurrent inserts of new keys may overshoot briefly, but every
    /// writer trims before returning, so the map is within bounds once writes
    /// settle. Expired entries go first; after that the least recently
    /// accessed entry other than `keep` is evicted, found by a full scan.
    fn enforce_capacity(&self, keep: &str) {
        let Some(max) = self.max_entries else {
            return;
        };
        if self.entries.len() <= max {
            return;
        }

        self.sweep_expired();
        while self.entries.len() > max {
            let victim = self
                .entries
                .iter()
                .filter(|item| item.key() != keep)
                .min_by_key(|item| item.value().last_access.load(Ordering::Relaxed))
                .map(|item| item.key().clone());

            let Some(victim) = victim else {
                break;
            };
            if self.entries.remove(&victim).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %victim, "Evicted least recently used entry");
            }
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> BackendResult<()> {
        let slot = self.slot(value, ttl, current_timestamp_ms());
        let expires_at = slot.expires_at;
        self.entries.insert(key.to_string(), slot);
        self.schedule(expires_at, key);
        self.enforce_capacity(key);
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> BackendResult<bool> {
        let now = current_timestamp_ms();
        let slot = self.slot(value, ttl, now);
        let expires_at = slot.expires_at;

        let written = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(slot);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                true
            }
        };

        if written {
            self.schedule(expires_at, key);
            self.enforce_capacity(key);
        }
        Ok(written)
    }

    async fn fetch(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        let now = current_timestamp_ms();
        let expired = match self.entries.get(key) {
            Some(slot) if !slot.is_expired(now) => {
                slot.last_access.store(self.tick(), Ordering::Relaxed);
                return Ok(Some(slot.value.clone()));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, slot| slot.is_expired(now));
        }
        Ok(None)
    }

    async fn remove(&self, key: &str) -> BackendResult<bool> {
        let now = current_timestamp_ms();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, slot)| !slot.is_expired(now)))
    }

    async fn ping(&self) -> BackendResult<bool> {
        Ok(true)
    }

    async fn entry_count(&self) -> BackendResult<Option<usize>> {
        Ok(Some(self.entries.len()))
    }

    /// Pops due expirations one at a time. The heap lock is held only for a
    /// single pop and each map shard only for a single removal.
    fn sweep_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let mut removed = 0;

        loop {
            let due = {
                let mut heap = self
                    .expirations
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                match heap.peek() {
                    Some(Reverse((expires_at, _))) if *expires_at <= now => heap.pop(),
                    _ => None,
                }
            };

            let Some(Reverse((expires_at, key))) = due else {
                break;
            };

            let evicted = self.entries.remove_if(&key, |_, slot| {
                slot.expires_at == Some(expires_at) && slot.is_expired(now)
            });
            if evicted.is_some() {
                removed += 1;
            }
        }

        removed
    }
}
