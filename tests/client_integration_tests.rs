//! Integration Tests for the Cache Client
//!
//! Exercises the public client API end to end: construction from settings,
//! TTL behaviour, racing fills and backend failure handling.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use beda_cache::backend::{BackendResult, InMemoryBackend, StorageBackend};
use beda_cache::cache::{CacheEntry, Codec};
use beda_cache::settings::MapSettings;
use beda_cache::{CacheClient, CacheConfig, CacheError};
use serde_json::{json, Value};

fn memory_client() -> CacheClient {
    CacheClient::from_config(&CacheConfig::default()).unwrap()
}

fn unreachable_redis_client() -> CacheClient {
    let settings = MapSettings::new()
        .with("BACKEND", "redis")
        .with("REDIS_URL", "redis://127.0.0.1:1/")
        .with("RETRY_BACKOFF_MS", "10");
    CacheClient::from_config(&CacheConfig::from_settings(&settings)).unwrap()
}

#[tokio::test]
async fn test_session_lifecycle() {
    let client = memory_client();

    client
        .set("session:42", &json!({"user": "ahmet"}), Some(1))
        .await
        .unwrap();
    let value: Option<Value> = client.get("session:42").await.unwrap();
    assert_eq!(value, Some(json!({"user": "ahmet"})));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let value: Option<Value> = client.get("session:42").await.unwrap();
    assert_eq!(value, None);
}

#[tokio::test]
async fn test_negative_ttl_is_invalid_argument() {
    let client = memory_client();
    let err = client.set("k", "v", Some(-1)).await.unwrap_err();
    assert!(matches!(err, CacheError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_unreachable_backend_is_not_absent() {
    let client = unreachable_redis_client();

    let started = Instant::now();
    let result = client.get::<String>("k").await;

    match result {
        Err(CacheError::BackendUnavailable {
            backend, attempts, ..
        }) => {
            assert_eq!(backend, "redis");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected BackendUnavailable, got {:?}", other),
    }
    // Two backoffs: 10ms then 20ms
    assert!(started.elapsed() >= Duration::from_millis(30));

    let stats = client.stats().await;
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.retries, 2);
}

#[tokio::test]
async fn test_unreachable_backend_fails_every_operation() {
    let client = unreachable_redis_client();

    assert!(client.set("k", "v", None).await.unwrap_err().is_unavailable());
    assert!(client.delete("k").await.unwrap_err().is_unavailable());
    assert!(client.exists("k").await.unwrap_err().is_unavailable());
    assert!(client.ping().await.unwrap_err().is_unavailable());
}

#[tokio::test]
async fn test_unreachable_backend_skips_factory() {
    let client = unreachable_redis_client();
    let calls = AtomicU32::new(0);

    let result: Result<String, CacheError> = client
        .get_or_set(
            "k",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                "computed".to_string()
            },
            None,
        )
        .await;

    assert!(result.unwrap_err().is_unavailable());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_get_or_set_single_factory_call() {
    let client = Arc::new(memory_client());
    let calls = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let client = client.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                client
                    .get_or_set(
                        "report",
                        || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            json!({"built_by": i})
                        },
                        Some(300),
                    )
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await.unwrap());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(values.iter().all(|v| v == &values[0]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sets_on_distinct_keys() {
    let client = Arc::new(memory_client());

    let handles: Vec<_> = (0..64)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                let key = format!("key:{}", i);
                client.set(&key, &i, None).await.unwrap();
                client.get::<i32>(&key).await.unwrap()
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap(), Some(i as i32));
    }
}

/// Delegates to memory, but stalls every write before it lands.
struct SlowWriteBackend {
    inner: InMemoryBackend,
    delay: Duration,
}

#[async_trait]
impl StorageBackend for SlowWriteBackend {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> BackendResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.put(key, value, ttl).await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> BackendResult<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.put_if_absent(key, value, ttl).await
    }

    async fn fetch(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        self.inner.fetch(key).await
    }

    async fn remove(&self, key: &str) -> BackendResult<bool> {
        self.inner.remove(key).await
    }

    async fn ping(&self) -> BackendResult<bool> {
        Ok(true)
    }
}

#[tokio::test]
async fn test_abandoned_set_leaves_no_partial_entry() {
    let backend = Arc::new(SlowWriteBackend {
        inner: InMemoryBackend::default(),
        delay: Duration::from_millis(200),
    });
    backend
        .inner
        .put("k", CacheEntry::new(Codec::Auto.encode("old").unwrap(), None).to_bytes(), None)
        .await
        .unwrap();
    let client = CacheClient::with_backend(&CacheConfig::default(), backend);

    // Give up on the write while the backend call is in flight
    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        client.set("k", &"new".repeat(1024), None),
    )
    .await;
    assert!(abandoned.is_err(), "write should still be in flight");

    let value: Option<String> = client.get("k").await.unwrap();
    let value = value.expect("key must keep a whole value");
    assert!(
        value == "old" || value == "new".repeat(1024),
        "unexpected partial value of {} bytes",
        value.len()
    );
}
