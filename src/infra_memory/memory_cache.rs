use crate::domain_port::*;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

enum Value {
    Str(String),
    ZSet(HashMap<String, i64>),
}

struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process `CacheBackend` with the same expiry and sorted-set semantics as
/// the Redis adapter. Expiry follows the tokio clock, so paused-time tests can
/// step over TTLs.
pub struct MemoryCache {
    entries: DashMap<String, Slot>,
    available: AtomicBool,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        MemoryCache {
            entries: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulates losing (or regaining) the backend: while unavailable every
    /// command fails with `CacheError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self, key: &str) -> Result<(), CacheError> {
        if !self.available.load(Ordering::Acquire) {
            return Err(CacheError::Unavailable("memory cache offline".to_string()));
        }
        let now = Instant::now();
        self.entries.remove_if(key, |_, slot| !slot.is_live(now));
        Ok(())
    }
}

// Redis answers an out-of-range expiry with the same error.
fn expiry_after(ttl: Duration) -> Result<Instant, CacheError> {
    Instant::now()
        .checked_add(ttl)
        .ok_or_else(|| CacheError::Command("invalid expire time".to_string()))
}

fn wrong_type() -> CacheError {
    CacheError::Command(
        "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
    )
}

#[async_trait::async_trait]
impl CacheBackend for MemoryCache {
    async fn set_px(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check(key)?;
        if ttl.is_zero() {
            return Err(CacheError::Command("invalid expire time".to_string()));
        }
        let expires_at = expiry_after(ttl)?;
        self.entries.insert(
            key.to_string(),
            Slot {
                value: Value::Str(value.to_string()),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check(key)?;
        match self.entries.get(key) {
            None => Ok(None),
            Some(slot) => match &slot.value {
                Value::Str(s) => Ok(Some(s.clone())),
                Value::ZSet(_) => Err(wrong_type()),
            },
        }
    }

    async fn getdel(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check(key)?;
        let removed = self
            .entries
            .remove_if(key, |_, slot| matches!(slot.value, Value::Str(_)));
        if let Some((_, Slot { value: Value::Str(s), .. })) = removed {
            return Ok(Some(s));
        }
        if self.entries.contains_key(key) {
            return Err(wrong_type());
        }
        Ok(None)
    }

    async fn pexpire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.check(key)?;
        if ttl.is_zero() {
            return Ok(self.entries.remove(key).is_some());
        }
        let expires_at = expiry_after(ttl)?;
        match self.entries.get_mut(key) {
            Some(mut slot) => {
                slot.expires_at = Some(expires_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn pexpire_at_least(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.check(key)?;
        let wanted = expiry_after(ttl)?;
        match self.entries.get_mut(key) {
            Some(mut slot) => {
                if slot.expires_at.is_none_or(|at| at < wanted) {
                    slot.expires_at = Some(wanted);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        self.check(key)?;
        Ok(self.entries.remove(key).is_some())
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), CacheError> {
        self.check(key)?;
        let mut slot = self.entries.entry(key.to_string()).or_insert_with(|| Slot {
            value: Value::ZSet(HashMap::new()),
            expires_at: None,
        });
        match &mut slot.value {
            Value::ZSet(set) => {
                set.insert(member.to_string(), score);
                Ok(())
            }
            Value::Str(_) => Err(wrong_type()),
        }
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        self.check(key)?;
        let removed = match self.entries.get_mut(key) {
            None => return Ok(false),
            Some(mut slot) => match &mut slot.value {
                Value::ZSet(set) => set.remove(member).is_some(),
                Value::Str(_) => return Err(wrong_type()),
            },
        };
        // Redis drops a sorted set once its last member is gone.
        self.entries
            .remove_if(key, |_, slot| matches!(&slot.value, Value::ZSet(set) if set.is_empty()));
        Ok(removed)
    }

    async fn zrange(&self, key: &str) -> Result<Vec<String>, CacheError> {
        self.check(key)?;
        let Some(slot) = self.entries.get(key) else {
            return Ok(Vec::new());
        };
        let Value::ZSet(set) = &slot.value else {
            return Err(wrong_type());
        };
        let mut members: Vec<(&String, &i64)> = set.iter().collect();
        members.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
        Ok(members.into_iter().map(|(m, _)| m.clone()).collect())
    }

    async fn zcard(&self, key: &str) -> Result<usize, CacheError> {
        self.check(key)?;
        match self.entries.get(key) {
            None => Ok(0),
            Some(slot) => match &slot.value {
                Value::ZSet(set) => Ok(set.len()),
                Value::Str(_) => Err(wrong_type()),
            },
        }
    }
}
