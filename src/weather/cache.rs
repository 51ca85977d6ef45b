use async_trait::async_trait;
use moka::future::Cache;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

/// Fast key/value tier with per-key expiry. Implementations swallow their own
/// failures: a broken backend looks like an empty cache.
#[async_trait]
pub trait FastCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set_ex(&self, key: &str, ttl: Duration, value: String);
    fn backend(&self) -> &'static str;
}

pub type SharedFastCache = Arc<dyn FastCache>;

/// Builds the fast tier from its connection string. `memory://` selects the
/// in-process cache; anything else is handed to the Redis client. A missing or
/// unusable URL means the tier is skipped.
pub fn fast_cache_from_url(url: Option<&str>, max_ttl: Duration) -> Option<SharedFastCache> {
    let url = url?.trim();
    if url.is_empty() {
        return None;
    }

    let cache: SharedFastCache = if url.starts_with("memory://") {
        Arc::new(MemoryFastCache::new(1000, max_ttl))
    } else {
        match RedisFastCache::open(url, Duration::from_millis(500)) {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                tracing::warn!("Invalid REDIS_URL, fast cache tier disabled: {}", e);
                return None;
            }
        }
    };

    tracing::info!("Fast cache tier: {}", cache.backend());
    Some(cache)
}

pub struct MemoryFastCache {
    inner: Cache<String, (String, Instant)>,
}

impl MemoryFastCache {
    pub fn new(max_capacity: u64, max_ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(max_ttl)
                .build(),
        }
    }
}

#[async_trait]
impl FastCache for MemoryFastCache {
    async fn get(&self, key: &str) -> Option<String> {
        let (value, expires) = self.inner.get(key).await?;
        if Instant::now() >= expires {
            self.inner.invalidate(key).await;
            return None;
        }
        Some(value)
    }

    async fn set_ex(&self, key: &str, ttl: Duration, value: String) {
        self.inner
            .insert(key.to_string(), (value, Instant::now() + ttl))
            .await;
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

pub struct RedisFastCache {
    client: redis::Client,
    connection: OnceCell<redis::aio::MultiplexedConnection>,
    op_timeout: Duration,
}

impl RedisFastCache {
    pub fn open(url: &str, op_timeout: Duration) -> redis::RedisResult<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
            connection: OnceCell::new(),
            op_timeout,
        })
    }

    /// Connects lazily; a failed attempt is not remembered, so the next call retries.
    async fn connection(&self) -> Option<redis::aio::MultiplexedConnection> {
        let result = self
            .connection
            .get_or_try_init(|| async {
                match tokio::time::timeout(
                    self.op_timeout,
                    self.client.get_multiplexed_tokio_connection(),
                )
                .await
                {
                    Ok(Ok(conn)) => Ok(conn),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err("connect timed out".to_string()),
                }
            })
            .await;

        match result {
            Ok(conn) => Some(conn.clone()),
            Err(e) => {
                tracing::warn!("Redis unavailable: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl FastCache for RedisFastCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.connection().await?;
        match tokio::time::timeout(self.op_timeout, conn.get::<_, Option<String>>(key)).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                tracing::warn!("Redis GET {} failed: {}", key, e);
                None
            }
            Err(_) => {
                tracing::warn!("Redis GET {} timed out", key);
                None
            }
        }
    }

    async fn set_ex(&self, key: &str, ttl: Duration, value: String) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        let seconds = ttl.as_secs().max(1);
        match tokio::time::timeout(
            self.op_timeout,
            conn.set_ex::<_, _, ()>(key, value, seconds),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Redis SETEX {} failed: {}", key, e),
            Err(_) => tracing::warn!("Redis SETEX {} timed out", key),
        }
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_round_trip() {
        let cache = MemoryFastCache::new(10, Duration::from_secs(60));
        assert_eq!(cache.get("weather:Oslo:NO").await, None);

        cache
            .set_ex("weather:Oslo:NO", Duration::from_secs(60), "{}".to_string())
            .await;
        assert_eq!(cache.get("weather:Oslo:NO").await.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_memory_cache_honours_per_key_ttl() {
        let cache = MemoryFastCache::new(10, Duration::from_secs(60));
        cache
            .set_ex("short", Duration::from_millis(20), "v".to_string())
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get("short").await, None);
    }

    #[tokio::test]
    async fn test_unreachable_redis_degrades_to_miss() {
        // Port 1 on loopback refuses connections.
        let cache = RedisFastCache::open("redis://127.0.0.1:1/", Duration::from_millis(200)).unwrap();

        assert_eq!(cache.get("weather:Paris:FR").await, None);
        cache
            .set_ex("weather:Paris:FR", Duration::from_secs(5), "{}".to_string())
            .await;
    }

    #[test]
    fn test_fast_cache_selection() {
        assert!(fast_cache_from_url(None, Duration::from_secs(60)).is_none());
        assert!(fast_cache_from_url(Some("  "), Duration::from_secs(60)).is_none());

        let memory = fast_cache_from_url(Some("memory://"), Duration::from_secs(60)).unwrap();
        assert_eq!(memory.backend(), "memory");

        let redis = fast_cache_from_url(Some("redis://127.0.0.1:6379"), Duration::from_secs(60)).unwrap();
        assert_eq!(redis.backend(), "redis");

        assert!(fast_cache_from_url(Some("not a url"), Duration::from_secs(60)).is_none());
    }
}
