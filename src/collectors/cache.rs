use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, FromRedisValue, RedisError, ToRedisArgs};

use super::elapsed_ms;
use crate::error::{MonitorError, Result as MonitorResult};
use crate::metrics::CacheOp;
use crate::monitor::Monitor;

/// Wraps a cache client and reports the timing of every call made through
/// it. Generic so any client can be measured through [`measure`](Self::measure);
/// Redis gets typed `get`/`set`/`delete` helpers.
#[derive(Clone)]
pub struct InstrumentedCache<C> {
    inner: C,
    monitor: Arc<Monitor>,
}

impl<C> InstrumentedCache<C> {
    pub fn new(inner: C, monitor: Arc<Monitor>) -> Self {
        Self { inner, monitor }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Times `fut` as one cache operation on `key` and returns its result
    /// unchanged, success or not.
    pub async fn measure<T, E, Fut>(&self, op: CacheOp, key: &str, fut: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        self.measure_with(op, key, fut, |_| None).await
    }

    async fn measure_with<T, E, Fut, H>(
        &self,
        op: CacheOp,
        key: &str,
        fut: Fut,
        hit: H,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        H: FnOnce(&T) -> Option<bool>,
    {
        let start = Instant::now();
        let result = fut.await;
        let duration_ms = elapsed_ms(start);
        let hit = result.as_ref().ok().and_then(hit);
        self.monitor
            .record_cache(op, key, duration_ms, hit, result.is_ok());
        result
    }
}

impl InstrumentedCache<ConnectionManager> {
    /// `ConnectionManager` is cheaply cloneable; every clone shares the same
    /// underlying multiplexed connection.
    pub async fn connect(url: &str, monitor: Arc<Monitor>) -> MonitorResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| MonitorError::config("cache.redis_url", e.to_string()))?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, monitor))
    }

    pub async fn get<V>(&self, key: &str) -> Result<Option<V>, RedisError>
    where
        V: FromRedisValue,
    {
        let mut conn = self.inner.clone();
        self.measure_with(
            CacheOp::Get,
            key,
            async move { conn.get::<_, Option<V>>(key).await },
            |v| Some(v.is_some()),
        )
        .await
    }

    /// Stores `value`, with an expiry when `ttl_secs` is given.
    pub async fn set<V>(&self, key: &str, value: V, ttl_secs: Option<u64>) -> Result<(), RedisError>
    where
        V: ToRedisArgs + Send + Sync,
    {
        let mut conn = self.inner.clone();
        self.measure(CacheOp::Set, key, async move {
            match ttl_secs {
                Some(secs) => conn.set_ex::<_, _, ()>(key, value, secs).await,
                None => conn.set::<_, _, ()>(key, value).await,
            }
        })
        .await
    }

    /// Returns how many keys were removed.
    pub async fn delete(&self, key: &str) -> Result<u64, RedisError> {
        let mut conn = self.inner.clone();
        self.measure(CacheOp::Delete, key, async move {
            conn.del::<_, u64>(key).await
        })
        .await
    }
}
