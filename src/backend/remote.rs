//! Redis Backend
//!
//! Network-attached storage through a single multiplexed connection. The
//! connection is opened on first use and dropped after a connection-level
//! failure, so the next attempt reconnects.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError, RedisResult};
use tokio::sync::Mutex;
use tracing::debug;

use super::{BackendError, BackendResult, StorageBackend};

/// Redis-backed storage.
pub struct RedisBackend {
    client: Client,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisBackend {
    /// Parses `url` without connecting.
    pub fn open(url: &str) -> RedisResult<Self> {
        Ok(Self {
            client: Client::open(url)?,
            conn: Mutex::new(None),
        })
    }

    async fn connection(&self) -> BackendResult<MultiplexedConnection> {
        let mut cached = self.conn.lock().await;
        if let Some(conn) = cached.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(classify)?;
        debug!("Opened Redis connection");
        *cached = Some(conn.clone());
        Ok(conn)
    }

    /// Maps a command result, forgetting the connection on transient errors.
    async fn finish<T>(&self, result: RedisResult<T>) -> BackendResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                let err = classify(err);
                if err.is_transient() {
                    *self.conn.lock().await = None;
                }
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("connection_info", self.client.get_connection_info())
            .finish()
    }
}

fn classify(err: RedisError) -> BackendError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        BackendError::Connection(err.to_string())
    } else {
        BackendError::Rejected(err.to_string())
    }
}

/// Longest `PX` we send. Redis adds the expire to the current time as a
/// signed 64-bit millisecond count and rejects anything that overflows.
const MAX_PX_MILLIS: u64 = i64::MAX as u64 / 2;

/// TTL in whole milliseconds for `PX`. Sub-millisecond TTLs round up to 1,
/// and TTLs past what Redis accepts are clamped; the envelope still carries
/// the exact deadline.
fn ttl_millis(ttl: Option<Duration>) -> Option<u64> {
    ttl.map(|ttl| {
        u64::try_from(ttl.as_millis())
            .unwrap_or(u64::MAX)
            .clamp(1, MAX_PX_MILLIS)
    })
}

#[async_trait]
impl StorageBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> BackendResult<()> {
        let mut conn = self.connection().await?;
        let result: RedisResult<()> = match ttl_millis(ttl) {
            Some(ms) => conn.pset_ex(key, value, ms).await,
            None => conn.set(key, value).await,
        };
        self.finish(result).await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> BackendResult<bool> {
        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ms) = ttl_millis(ttl) {
            cmd.arg("PX").arg(ms);
        }

        // Nil when the key already exists
        let result: RedisResult<Option<String>> = cmd.query_async(&mut conn).await;
        Ok(self.finish(result).await?.is_some())
    }

    async fn fetch(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        let result: RedisResult<Option<Vec<u8>>> = conn.get(key).await;
        self.finish(result).await
    }

    async fn remove(&self, key: &str) -> BackendResult<bool> {
        let mut conn = self.connection().await?;
        let result: RedisResult<i64> = conn.del(key).await;
        Ok(self.finish(result).await? > 0)
    }

    async fn ping(&self) -> BackendResult<bool> {
        let mut conn = self.connection().await?;
        let result: RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        Ok(self.finish(result).await? == "PONG")
    }

    /// Size of the whole Redis database, other namespaces included.
    async fn entry_count(&self) -> BackendResult<Option<usize>> {
        let mut conn = self.connection().await?;
        let result: RedisResult<usize> = redis::cmd("DBSIZE").query_async(&mut conn).await;
        Ok(Some(self.finish(result).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Nothing listens on port 1, so connects are refused immediately.
    const UNREACHABLE: &str = "redis://127.0.0.1:1/";

    #[test]
    fn test_ttl_millis() {
        assert_eq!(ttl_millis(None), None);
        assert_eq!(ttl_millis(Some(Duration::from_secs(5))), Some(5_000));
        assert_eq!(ttl_millis(Some(Duration::from_micros(10))), Some(1));
    }

    #[test]
    fn test_ttl_millis_clamps_huge_ttls() {
        let huge = Duration::from_secs(i64::MAX as u64);
        assert_eq!(ttl_millis(Some(huge)), Some(MAX_PX_MILLIS));
        assert_eq!(ttl_millis(Some(Duration::MAX)), Some(MAX_PX_MILLIS));
    }

    #[test]
    fn test_open_rejects_malformed_url() {
        assert!(RedisBackend::open("definitely not a url").is_err());
        assert!(RedisBackend::open(UNREACHABLE).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        let backend = RedisBackend::open(UNREACHABLE).unwrap();

        let err = backend.fetch("k").await.unwrap_err();
        assert!(err.is_transient(), "unexpected classification: {}", err);

        let err = backend.put("k", b"v".to_vec(), None).await.unwrap_err();
        assert!(err.is_transient());
    }
}
