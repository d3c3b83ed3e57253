use std::sync::Arc;
use std::time::Duration;

/// Shared handle to a connected cache. Cloning is cheap and every clone talks
/// to the same connection.
pub type CacheHandle = Arc<dyn CacheBackend>;

/// The subset of key-value store commands the token store relies on. Each
/// method is a single round trip and safe to call concurrently.
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    /// Set `key` to `value`, expiring after `ttl` (millisecond precision).
    async fn set_px(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Read and delete `key` atomically.
    async fn getdel(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Re-arm the expiry of an existing key. Returns false if the key is gone.
    async fn pexpire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Push the expiry of an existing key out to `ttl` unless it already lives
    /// longer. Keys without an expiry get one.
    async fn pexpire_at_least(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    async fn del(&self, key: &str) -> Result<bool, CacheError>;

    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), CacheError>;

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, CacheError>;

    /// All members, lowest score first (ties ordered by member).
    async fn zrange(&self, key: &str) -> Result<Vec<String>, CacheError>;

    async fn zcard(&self, key: &str) -> Result<usize, CacheError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("invalid cache address: {0}")]
    InvalidAddress(String),
    #[error("cache rejected credentials: {0}")]
    AuthRejected(String),
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cache command failed: {0}")]
    Command(String),
    #[error("cache deadline exceeded")]
    DeadlineExceeded,
    #[error("cache client closed")]
    Closed,
}
