//! Token store backend: Redis when configured, in-memory otherwise.
//!
//! Redis failures never surface to callers; reads and writes degrade to
//! the local map with a warning. Expiry is enforced lazily on read as well,
//! since the fallback map has no background eviction and Redis TTL
//! eviction may lag.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;

/// A stored value with its expiry, for the in-memory map.
#[derive(Debug, Clone)]
pub(crate) struct StoredEntry {
    pub(crate) value: String,
    pub(crate) stored_at: Instant,
    pub(crate) ttl: Duration,
}

impl StoredEntry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            ttl,
        }
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

/// Key/value store for patient tokens.
///
/// - `Memory`: in-process map only (degraded, non-production mode)
/// - `Redis`: Redis with the in-process map as a transparent fallback
pub enum TokenStoreBackend {
    /// In-process map only.
    Memory(Arc<DashMap<String, StoredEntry>>),

    /// Redis, falling back to an in-process map when unreachable.
    Redis {
        /// Redis connection pool.
        pool: Pool,
        /// Fallback map used when Redis cannot be reached.
        fallback: Arc<DashMap<String, StoredEntry>>,
    },
}

impl TokenStoreBackend {
    /// Creates an in-memory backend.
    #[must_use]
    pub fn new_memory() -> Self {
        Self::Memory(Arc::new(DashMap::new()))
    }

    /// Creates a Redis-backed backend.
    #[must_use]
    pub fn new_redis(pool: Pool) -> Self {
        Self::Redis {
            pool,
            fallback: Arc::new(DashMap::new()),
        }
    }

    /// Reads a value, treating expired entries as absent and deleting them.
    pub async fn get(&self, key: &str) -> Option<String> {
        match self {
            Self::Memory(map) => read_local(map, key),
            Self::Redis { pool, fallback } => match pool.get().await {
                Ok(mut conn) => match conn.get::<_, Option<String>>(key).await {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Redis GET failed, using fallback");
                        read_local(fallback, key)
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Redis connection failed, using fallback");
                    read_local(fallback, key)
                }
            },
        }
    }

    /// Writes a value with a TTL.
    pub async fn set(&self, key: &str, value: String, ttl: Duration) {
        match self {
            Self::Memory(map) => {
                map.insert(key.to_string(), StoredEntry::new(value, ttl));
            }
            Self::Redis { pool, fallback } => {
                let write = async {
                    let mut conn = pool.get().await.map_err(|e| e.to_string())?;
                    conn.set_ex::<_, _, ()>(key, &value, ttl.as_secs())
                        .await
                        .map_err(|e| e.to_string())
                };
                if let Err(e) = write.await {
                    tracing::warn!(key = %key, error = %e, "Redis SET failed, using fallback");
                    fallback.insert(key.to_string(), StoredEntry::new(value, ttl));
                }
            }
        }
    }

    /// Deletes a value. Deleting an absent key is not an error.
    pub async fn delete(&self, key: &str) {
        match self {
            Self::Memory(map) => {
                map.remove(key);
            }
            Self::Redis { pool, fallback } => {
                fallback.remove(key);
                match pool.get().await {
                    Ok(mut conn) => {
                        if let Err(e) = conn.del::<_, ()>(key).await {
                            tracing::warn!(key = %key, error = %e, "Redis DEL failed");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Redis connection failed during delete");
                    }
                }
            }
        }
    }

    /// Returns the local map, for inspection in tests.
    #[cfg(test)]
    pub(crate) fn local(&self) -> &Arc<DashMap<String, StoredEntry>> {
        match self {
            Self::Memory(map) => map,
            Self::Redis { fallback, .. } => fallback,
        }
    }
}

impl std::fmt::Debug for TokenStoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self {
            Self::Memory(_) => "memory",
            Self::Redis { .. } => "redis",
        };
        f.debug_struct("TokenStoreBackend")
            .field("mode", &mode)
            .finish()
    }
}

/// Reads from a local map with lazy expiry.
fn read_local(map: &DashMap<String, StoredEntry>, key: &str) -> Option<String> {
    let entry = map.get(key)?;
    if entry.is_expired() {
        drop(entry);
        map.remove(key);
        return None;
    }
    Some(entry.value.clone())
}
