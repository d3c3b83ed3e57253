use crate::domain_model::*;
use crate::domain_port::CacheError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TokenStoreError {
    /// Absent, expired or revoked. Expected in normal operation.
    #[error("session not found")]
    NotFound,
    /// Backend unreachable, credentials rejected, or deadline exceeded.
    #[error("session backend error: {0}")]
    Connection(#[from] CacheError),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone)]
pub struct TokenStoreConfig {
    pub ttl_default: Duration,
    /// Re-arm a session's TTL on every successful `validate`.
    pub sliding_expiration: bool,
    /// `None` means unlimited. When exceeded, the oldest issued tokens of the
    /// subject are evicted.
    pub max_tokens_per_subject: Option<usize>,
}

impl Default for TokenStoreConfig {
    fn default() -> Self {
        TokenStoreConfig {
            ttl_default: Duration::from_secs(24 * 60 * 60),
            sliding_expiration: false,
            max_tokens_per_subject: None,
        }
    }
}

#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Issue a token for `subject_id`. `ttl` falls back to the configured
    /// default; a zero TTL yields a token that is never persisted.
    async fn issue(
        &self,
        subject_id: &SubjectId,
        ttl: Option<Duration>,
        metadata: Metadata,
        deadline: Deadline,
    ) -> Result<Token, TokenStoreError>;

    async fn validate(&self, token: &TokenId, deadline: Deadline)
    -> Result<Session, TokenStoreError>;

    /// Read and remove a session in one step. At most one caller gets it.
    async fn consume(&self, token: &TokenId, deadline: Deadline)
    -> Result<Session, TokenStoreError>;

    /// Idempotent.
    async fn revoke(&self, token: &TokenId, deadline: Deadline) -> Result<(), TokenStoreError>;

    /// Returns how many live sessions were removed.
    async fn revoke_all_for_subject(
        &self,
        subject_id: &SubjectId,
        deadline: Deadline,
    ) -> Result<usize, TokenStoreError>;

    /// Live tokens of a subject, oldest first.
    async fn list_for_subject(
        &self,
        subject_id: &SubjectId,
        deadline: Deadline,
    ) -> Result<Vec<Token>, TokenStoreError>;

    fn config(&self) -> &TokenStoreConfig;
}
