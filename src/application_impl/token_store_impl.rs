use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use chrono::Utc;
use std::future::Future;
use std::time::Duration;

pub const SESSION_PREFIX: &str = "session";
pub const SUBJECT_PREFIX: &str = "subject-sessions";

/// Token store over a shared cache handle.
///
/// Primary records live under `session:<token>` with the store's native TTL.
/// `subject-sessions:<subject>` is a sorted set of the subject's tokens scored
/// by issuance time (microseconds); it only serves bulk revocation, listing
/// and eviction, and may briefly disagree with the primary records. Readers
/// drop index entries whose primary record is gone.
pub struct CacheTokenStore {
    cache: CacheHandle,
    config: TokenStoreConfig,
}

impl CacheTokenStore {
    pub fn new(cache: CacheHandle, config: TokenStoreConfig) -> Self {
        CacheTokenStore { cache, config }
    }

    fn session_key(token: &TokenId) -> String {
        format!("{}:{}", SESSION_PREFIX, token)
    }

    fn subject_key(subject_id: &SubjectId) -> String {
        format!("{}:{}", SUBJECT_PREFIX, subject_id)
    }

    fn decode(raw: &str) -> Result<Session, TokenStoreError> {
        serde_json::from_str(raw)
            .map_err(|e| TokenStoreError::Internal(format!("corrupt session record: {}", e)))
    }

    fn max_tokens(&self) -> Option<usize> {
        self.config.max_tokens_per_subject.filter(|max| *max > 0)
    }

    /// Remove the primary record and return it, then drop the index entry.
    async fn take(&self, token: &TokenId) -> Result<Option<Session>, TokenStoreError> {
        let Some(raw) = self.cache.getdel(&Self::session_key(token)).await? else {
            return Ok(None);
        };
        let session = Self::decode(&raw)?;
        self.cache
            .zrem(&Self::subject_key(&session.subject_id), token.as_str())
            .await?;
        Ok(Some(session))
    }

    /// Evict the oldest live tokens of a subject beyond `max`. Index entries
    /// whose primary record already expired are pruned and do not count.
    async fn evict_overflow(&self, index: &str, max: usize) -> Result<(), TokenStoreError> {
        if self.cache.zcard(index).await? <= max {
            return Ok(());
        }
        let mut live = Vec::new();
        for member in self.cache.zrange(index).await? {
            let token = TokenId::parse(&member);
            let exists = match &token {
                Some(token) => self.cache.get(&Self::session_key(token)).await?.is_some(),
                None => false,
            };
            match token {
                Some(token) if exists => live.push((member, token)),
                _ => {
                    self.cache.zrem(index, &member).await?;
                    debug!(index, "pruned stale index entry");
                }
            }
        }

        let excess = live.len().saturating_sub(max);
        for (member, token) in live.into_iter().take(excess) {
            self.cache.del(&Self::session_key(&token)).await?;
            self.cache.zrem(index, &member).await?;
            debug!(index, ?token, "evicted oldest session");
        }
        Ok(())
    }
}

/// Run `fut` under `deadline`. Running out of time is a connection failure,
/// never a missing session.
async fn within<T, F>(deadline: Deadline, fut: F) -> Result<T, TokenStoreError>
where
    F: Future<Output = Result<T, TokenStoreError>>,
{
    if deadline.is_elapsed() {
        return Err(CacheError::DeadlineExceeded.into());
    }
    tokio::time::timeout_at(deadline.instant(), fut)
        .await
        .map_err(|_| TokenStoreError::Connection(CacheError::DeadlineExceeded))?
}

fn std_duration(d: chrono::Duration) -> Duration {
    d.to_std().unwrap_or(Duration::ZERO)
}

#[async_trait::async_trait]
impl TokenStore for CacheTokenStore {
    async fn issue(
        &self,
        subject_id: &SubjectId,
        ttl: Option<Duration>,
        metadata: Metadata,
        deadline: Deadline,
    ) -> Result<Token, TokenStoreError> {
        if subject_id.as_str().is_empty() {
            return Err(TokenStoreError::Internal("empty subject id".to_string()));
        }
        let ttl = ttl.unwrap_or(self.config.ttl_default);
        let lifetime = chrono::Duration::from_std(ttl)
            .map_err(|e| TokenStoreError::Internal(format!("ttl out of range: {}", e)))?;
        let issued_at = Utc::now();
        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .ok_or_else(|| TokenStoreError::Internal(format!("ttl out of range: {:?}", ttl)))?;
        let token = Token {
            id: TokenId::generate(),
            subject_id: subject_id.clone(),
            issued_at,
            expires_at,
            metadata,
        };

        if ttl.is_zero() {
            debug!(subject = %subject_id, "zero ttl, session not persisted");
            return Ok(token);
        }

        within(deadline, async {
            let raw = serde_json::to_string(&token.session())
                .map_err(|e| TokenStoreError::Internal(e.to_string()))?;
            self.cache
                .set_px(&Self::session_key(&token.id), &raw, ttl)
                .await?;

            let index = Self::subject_key(subject_id);
            self.cache
                .zadd(&index, token.id.as_str(), issued_at.timestamp_micros())
                .await?;
            self.cache.pexpire_at_least(&index, ttl).await?;

            if let Some(max) = self.max_tokens() {
                self.evict_overflow(&index, max).await?;
            }
            Ok(())
        })
        .await?;

        debug!(subject = %subject_id, token = ?token.id, ttl_secs = ttl.as_secs(), "session issued");
        Ok(token)
    }

    async fn validate(
        &self,
        token: &TokenId,
        deadline: Deadline,
    ) -> Result<Session, TokenStoreError> {
        within(deadline, async {
            let key = Self::session_key(token);
            let raw = self.cache.get(&key).await?.ok_or(TokenStoreError::NotFound)?;
            let mut session = Self::decode(&raw)?;

            if self.config.sliding_expiration {
                let lifetime = session.lifetime();
                let ttl = std_duration(lifetime);
                if !self.cache.pexpire(&key, ttl).await? {
                    return Err(TokenStoreError::NotFound);
                }
                self.cache
                    .pexpire_at_least(&Self::subject_key(&session.subject_id), ttl)
                    .await?;
                let now = Utc::now();
                session.expires_at = now.checked_add_signed(lifetime).unwrap_or(now);
            }
            Ok(session)
        })
        .await
    }

    async fn consume(
        &self,
        token: &TokenId,
        deadline: Deadline,
    ) -> Result<Session, TokenStoreError> {
        within(deadline, async {
            self.take(token).await?.ok_or(TokenStoreError::NotFound)
        })
        .await
    }

    async fn revoke(&self, token: &TokenId, deadline: Deadline) -> Result<(), TokenStoreError> {
        within(deadline, async {
            if let Some(session) = self.take(token).await? {
                debug!(subject = %session.subject_id, ?token, "session revoked");
            }
            Ok(())
        })
        .await
    }

    async fn revoke_all_for_subject(
        &self,
        subject_id: &SubjectId,
        deadline: Deadline,
    ) -> Result<usize, TokenStoreError> {
        within(deadline, async {
            let index = Self::subject_key(subject_id);
            let members = self.cache.zrange(&index).await?;
            let mut revoked = 0;
            for member in &members {
                if let Some(token) = TokenId::parse(member) {
                    if self.cache.del(&Self::session_key(&token)).await? {
                        revoked += 1;
                    }
                }
                // Per member rather than DEL on the index, so a token issued
                // meanwhile keeps its entry.
                self.cache.zrem(&index, member).await?;
            }
            info!(subject = %subject_id, revoked, "revoked all sessions of subject");
            Ok(revoked)
        })
        .await
    }

    async fn list_for_subject(
        &self,
        subject_id: &SubjectId,
        deadline: Deadline,
    ) -> Result<Vec<Token>, TokenStoreError> {
        within(deadline, async {
            let index = Self::subject_key(subject_id);
            let members = self.cache.zrange(&index).await?;
            let mut tokens = Vec::with_capacity(members.len());
            for member in &members {
                let live = match TokenId::parse(member) {
                    Some(token) => self
                        .cache
                        .get(&Self::session_key(&token))
                        .await?
                        .map(|raw| (token, raw)),
                    None => None,
                };
                match live {
                    Some((token, raw)) => tokens.push(Token::from_session(token, Self::decode(&raw)?)),
                    None => {
                        self.cache.zrem(&index, member).await?;
                        debug!(subject = %subject_id, "pruned stale index entry");
                    }
                }
            }
            Ok(tokens)
        })
        .await
    }

    fn config(&self) -> &TokenStoreConfig {
        &self.config
    }
}
