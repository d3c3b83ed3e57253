use crate::domain_port::*;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ErrorKind, RedisError, Script};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const PEXPIRE_AT_LEAST: &str = include_str!("pexpire_at_least.lua");

/// `CacheBackend` over a multiplexed, self-reconnecting Redis connection.
pub struct RedisCache {
    conn: ConnectionManager,
    closed: Arc<AtomicBool>,
    pexpire_at_least: Script,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager, closed: Arc<AtomicBool>) -> Self {
        RedisCache {
            conn,
            closed,
            pexpire_at_least: Script::new(PEXPIRE_AT_LEAST),
        }
    }

    fn conn(&self) -> Result<ConnectionManager, CacheError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        Ok(self.conn.clone())
    }
}

/// The server refused our credentials. Depending on the server version this
/// arrives as a typed auth failure or as a raw `WRONGPASS`/`NOAUTH` reply.
pub(crate) fn is_auth_rejection(e: &RedisError) -> bool {
    e.kind() == ErrorKind::AuthenticationFailed || matches!(e.code(), Some("WRONGPASS" | "NOAUTH"))
}

pub(crate) fn cache_error(e: RedisError) -> CacheError {
    if is_auth_rejection(&e) {
        return CacheError::AuthRejected(e.to_string());
    }
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
    {
        return CacheError::Unavailable(e.to_string());
    }
    CacheError::Command(e.to_string())
}

// Redis refuses a zero expiry, sub-millisecond TTLs round up.
fn millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait::async_trait]
impl CacheBackend for RedisCache {
    async fn set_px(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn()?;
        let _: () = conn
            .pset_ex(key, value, millis(ttl))
            .await
            .map_err(cache_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn()?;
        let val: Option<String> = conn.get(key).await.map_err(cache_error)?;
        Ok(val)
    }

    async fn getdel(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn()?;
        let val: Option<String> = conn.get_del(key).await.map_err(cache_error)?;
        Ok(val)
    }

    async fn pexpire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.conn()?;
        let applied: bool = conn
            .pexpire(key, millis(ttl) as i64)
            .await
            .map_err(cache_error)?;
        Ok(applied)
    }

    async fn pexpire_at_least(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.conn()?;
        let status: i64 = self
            .pexpire_at_least
            .key(key)
            .arg(millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(cache_error)?;
        Ok(status == 1)
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn()?;
        let removed: usize = conn.del(key).await.map_err(cache_error)?;
        Ok(removed > 0)
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), CacheError> {
        let mut conn = self.conn()?;
        let _: () = conn.zadd(key, member, score).await.map_err(cache_error)?;
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn()?;
        let removed: usize = conn.zrem(key, member).await.map_err(cache_error)?;
        Ok(removed > 0)
    }

    async fn zrange(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn()?;
        let members: Vec<String> = conn.zrange(key, 0, -1).await.map_err(cache_error)?;
        Ok(members)
    }

    async fn zcard(&self, key: &str) -> Result<usize, CacheError> {
        let mut conn = self.conn()?;
        let count: usize = conn.zcard(key).await.map_err(cache_error)?;
        Ok(count)
    }
}
