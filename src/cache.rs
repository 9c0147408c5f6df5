// src/cache.rs

use std::future::Future;
use std::time::Duration;

use redis::{AsyncCommands, aio::ConnectionManager};
use serde::{Serialize, de::DeserializeOwned};
use tokio::time::timeout;

use crate::error::AppError;

/// Upper bound on any single Redis round trip. A down cache must never
/// delay the request path much beyond direct-store latency.
const CACHE_OP_TIMEOUT: Duration = Duration::from_secs(2);

/// Read-through cache over Redis.
///
/// The connection is optional: when no `REDIS_URL` is configured, or the
/// initial connection fails, every read falls through to the compute
/// closure (i.e. straight to Postgres) and writes become no-ops. Cache
/// errors are logged and swallowed; they never propagate to callers.
#[derive(Clone)]
pub struct Cache {
    conn: Option<ConnectionManager>,
}

impl Cache {
    /// Connects to Redis if a URL is provided. Connection failure is not
    /// fatal: the app starts in direct-store mode.
    pub async fn connect(redis_url: Option<&str>) -> Self {
        let Some(url) = redis_url else {
            tracing::info!("REDIS_URL not set, cache disabled");
            return Self::disabled();
        };

        let client = match redis::Client::open(url) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("Invalid REDIS_URL, cache disabled: {}", e);
                return Self::disabled();
            }
        };

        match timeout(CACHE_OP_TIMEOUT, ConnectionManager::new(client)).await {
            Ok(Ok(conn)) => {
                tracing::info!("Redis connected");
                Self { conn: Some(conn) }
            }
            Ok(Err(e)) => {
                tracing::warn!("Redis connection failed, cache disabled: {}", e);
                Self::disabled()
            }
            Err(_) => {
                tracing::warn!("Redis connection timed out, cache disabled");
                Self::disabled()
            }
        }
    }

    /// A cache that always misses. Used when Redis is not configured and
    /// in tests that exercise direct-store mode.
    pub fn disabled() -> Self {
        Self { conn: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    /// Returns the cached value for `key`, or computes it from the store
    /// and writes it back with the given TTL.
    ///
    /// Cache read failures (timeout, connection error, corrupt payload)
    /// fall through to `compute`. The write-back is best effort: a failed
    /// SET is logged but the computed value is still returned.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &str,
        ttl_seconds: u64,
        compute: F,
    ) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if let Some(conn) = &self.conn {
            let mut conn = conn.clone();
            match timeout(CACHE_OP_TIMEOUT, conn.get::<_, Option<String>>(key)).await {
                Ok(Ok(Some(raw))) => match serde_json::from_str::<T>(&raw) {
                    Ok(value) => return Ok(value),
                    Err(e) => {
                        // Corrupt entry: treat as a miss, recompute overwrites it.
                        tracing::warn!("Discarding corrupt cache entry \"{}\": {}", key, e);
                    }
                },
                Ok(Ok(None)) => {}
                Ok(Err(e)) => tracing::warn!("Cache GET failed for \"{}\": {}", key, e),
                Err(_) => tracing::warn!("Cache GET timed out for \"{}\"", key),
            }
        }

        let value = compute().await?;

        if let Some(conn) = &self.conn {
            match serde_json::to_string(&value) {
                Ok(raw) => {
                    let mut conn = conn.clone();
                    match timeout(
                        CACHE_OP_TIMEOUT,
                        conn.set_ex::<_, _, ()>(key, raw, ttl_seconds),
                    )
                    .await
                    {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => tracing::warn!("Cache SET failed for \"{}\": {}", key, e),
                        Err(_) => tracing::warn!("Cache SET timed out for \"{}\"", key),
                    }
                }
                Err(e) => tracing::warn!("Failed to serialize cache value for \"{}\": {}", key, e),
            }
        }

        Ok(value)
    }

    /// Deletes every key containing `pattern` (SCAN `*pattern*` + DEL in
    /// batches). No-op when the cache is disabled; partial failures are
    /// logged and the remaining batches are abandoned, never raised.
    ///
    /// Callers must mutate the store first and invalidate second, so a
    /// concurrent reader can never repopulate the cache from stale data.
    pub async fn invalidate(&self, pattern: &str) {
        let Some(conn) = &self.conn else { return };
        let mut conn = conn.clone();
        let match_expr = format!("*{}*", pattern);

        let mut cursor: u64 = 0;
        loop {
            let mut scan = redis::cmd("SCAN");
            scan.arg(cursor)
                .arg("MATCH")
                .arg(&match_expr)
                .arg("COUNT")
                .arg(100);

            let reply = timeout(
                CACHE_OP_TIMEOUT,
                scan.query_async::<(u64, Vec<String>)>(&mut conn),
            )
            .await;
            let (next, keys) = match reply {
                Ok(Ok(reply)) => reply,
                Ok(Err(e)) => {
                    tracing::warn!("Cache SCAN failed for pattern \"{}\": {}", pattern, e);
                    return;
                }
                Err(_) => {
                    tracing::warn!("Cache SCAN timed out for pattern \"{}\"", pattern);
                    return;
                }
            };

            if !keys.is_empty() {
                match timeout(CACHE_OP_TIMEOUT, conn.del::<_, ()>(&keys)).await {
                    Ok(Ok(())) => {
                        tracing::debug!("Invalidated {} cache keys ({})", keys.len(), pattern)
                    }
                    Ok(Err(e)) => {
                        tracing::warn!("Cache DEL failed for pattern \"{}\": {}", pattern, e);
                        return;
                    }
                    Err(_) => {
                        tracing::warn!("Cache DEL timed out for pattern \"{}\"", pattern);
                        return;
                    }
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }
    }
}
