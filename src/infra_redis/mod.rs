mod cache_client;
mod redis_cache;

pub use cache_client::*;
pub use redis_cache::RedisCache;
