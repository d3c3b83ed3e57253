use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Errors handed to request handlers. Backend detail never crosses this
/// boundary; it is logged where the error is translated.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("service temporarily unavailable")]
    Unavailable,
    #[error("internal error: {0}")]
    InternalError(String),
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
    pub metadata: Metadata,
}

/// What a client gets back after login or refresh.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub subject_id: SubjectId,
    pub expires_at: DateTime<Utc>,
}

impl From<Token> for IssuedToken {
    fn from(token: Token) -> Self {
        IssuedToken {
            token: token.id.to_string(),
            subject_id: token.subject_id,
            expires_at: token.expires_at,
        }
    }
}

#[async_trait::async_trait]
pub trait SessionAuthenticator: Send + Sync {
    async fn login(&self, request: LoginInput) -> Result<IssuedToken, AuthError>;
    /// Resolve a raw bearer token to its subject.
    async fn authenticate(&self, token: &str) -> Result<SubjectId, AuthError>;
    /// Rotate: the presented token stops working and a fresh one is returned.
    /// The old token is consumed first, so a backend failure while issuing
    /// the new one ends the session (`Unavailable`) instead of leaving two
    /// usable tokens.
    async fn refresh(&self, token: &str) -> Result<IssuedToken, AuthError>;
    async fn logout(&self, token: &str) -> Result<(), AuthError>;
    /// Revoke every session of the token's subject.
    async fn logout_all(&self, token: &str) -> Result<usize, AuthError>;
}
