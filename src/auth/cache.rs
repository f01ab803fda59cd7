use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::{future::Cache, policy::EvictionPolicy, Expiry};
use redis::aio::ConnectionManager;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache miss")]
    Miss,
    #[error("session cache unavailable: {0}")]
    Io(String),
}

/// Ephemeral key/value storage for issued sessions.
#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
    /// `Miss` for absent and expired keys alike.
    async fn get(&self, key: &str) -> Result<String, CacheError>;
    async fn ping(&self) -> Result<(), CacheError>;
}

#[derive(Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Each entry expires after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process session cache backed by `moka`, for tests and single-node use.
///
/// When full, the least recently used session is evicted; a fresh login is
/// always admitted.
#[derive(Clone)]
pub struct MemorySessionCache {
    inner: Cache<String, Entry>,
}

impl MemorySessionCache {
    pub fn new(max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(PerEntryTtl)
            .build();
        Self { inner }
    }
}

#[async_trait]
impl SessionCache for MemorySessionCache {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.inner
            .insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<String, CacheError> {
        self.inner
            .get(key)
            .await
            .map(|e| e.value)
            .ok_or(CacheError::Miss)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Shared session cache on Redis. Keys carry their own `PX` expiry.
#[derive(Clone)]
pub struct RedisSessionCache {
    conn: ConnectionManager,
}

impl RedisSessionCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(redis_error)?;
        let conn = ConnectionManager::new(client).await.map_err(redis_error)?;
        Ok(Self { conn })
    }
}

fn redis_error(e: redis::RedisError) -> CacheError {
    CacheError::Io(e.to_string())
}

#[async_trait]
impl SessionCache for RedisSessionCache {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let millis = ttl.as_millis().max(1) as u64;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(redis_error)
    }

    async fn get(&self, key: &str) -> Result<String, CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(redis_error)?
            .ok_or(CacheError::Miss)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_returns_value() {
        let cache = MemorySessionCache::new(16);
        cache
            .put("token:abc", "assertion", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("token:abc").await.unwrap(), "assertion");
    }

    #[tokio::test]
    async fn unknown_key_is_a_miss() {
        let cache = MemorySessionCache::new(16);
        assert!(matches!(cache.get("token:nope").await, Err(CacheError::Miss)));
    }

    #[tokio::test]
    async fn entry_is_unreadable_after_ttl() {
        let cache = MemorySessionCache::new(16);
        cache
            .put("token:short", "assertion", Duration::from_millis(50))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(matches!(cache.get("token:short").await, Err(CacheError::Miss)));
    }

    #[tokio::test]
    async fn ttls_are_tracked_per_entry() {
        let cache = MemorySessionCache::new(16);
        cache
            .put("token:short", "a", Duration::from_millis(50))
            .await
            .unwrap();
        cache
            .put("token:long", "b", Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.get("token:short").await.is_err());
        assert_eq!(cache.get("token:long").await.unwrap(), "b");
    }

    #[tokio::test]
    async fn full_cache_still_admits_fresh_sessions() {
        let cache = MemorySessionCache::new(8);
        for i in 0..8 {
            let key = format!("token:old-{i}");
            cache.put(&key, "old", Duration::from_secs(60)).await.unwrap();
            cache.get(&key).await.unwrap();
        }
        cache.inner.run_pending_tasks().await;

        for i in 0..4 {
            let key = format!("token:new-{i}");
            cache.put(&key, "fresh", Duration::from_secs(60)).await.unwrap();
            cache.inner.run_pending_tasks().await;
            assert_eq!(cache.get(&key).await.unwrap(), "fresh", "{key}");
        }
        assert!(cache.inner.entry_count() <= 8);
    }

    #[tokio::test]
    async fn redis_rejects_malformed_url() {
        assert!(matches!(
            RedisSessionCache::connect("not a url").await,
            Err(CacheError::Io(_))
        ));
    }

    /// Needs a reachable Redis at `REDIS_URL`.
    #[tokio::test]
    #[ignore = "requires REDIS_URL"]
    async fn redis_round_trip_and_expiry() {
        let url = std::env::var("REDIS_URL").expect("REDIS_URL");
        let cache = RedisSessionCache::connect(&url).await.unwrap();
        cache.ping().await.unwrap();

        let key = format!("token:test-{}", std::process::id());
        cache.put(&key, "assertion", Duration::from_millis(200)).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), "assertion");
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(matches!(cache.get(&key).await, Err(CacheError::Miss)));
    }
}
