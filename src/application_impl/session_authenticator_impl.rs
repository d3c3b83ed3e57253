use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use std::sync::Arc;
use std::time::Duration;

pub struct RealSessionAuthenticator {
    token_store: Arc<dyn TokenStore>,
    credential_verifier: Arc<dyn CredentialVerifier>,
    request_timeout: Duration,
}

impl RealSessionAuthenticator {
    pub fn new(
        token_store: Arc<dyn TokenStore>,
        credential_verifier: Arc<dyn CredentialVerifier>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            token_store,
            credential_verifier,
            request_timeout,
        }
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.request_timeout)
    }

    /// Resolve a presented token to its session. Every failure reaches the
    /// caller as `Unauthenticated`; the cause is only logged.
    async fn verified_session(&self, raw: &str) -> Result<Session, AuthError> {
        let Some(token) = TokenId::parse(raw) else {
            debug!("malformed token presented");
            return Err(AuthError::Unauthenticated);
        };
        self.token_store
            .validate(&token, self.deadline())
            .await
            .map_err(|e| unauthenticated(&token, e))
    }
}

fn unauthenticated(token: &TokenId, error: TokenStoreError) -> AuthError {
    match error {
        TokenStoreError::NotFound => debug!(?token, "unknown or expired token"),
        TokenStoreError::Connection(e) => {
            warn!(?token, error = %e, "session backend failure during authentication")
        }
        TokenStoreError::Internal(e) => {
            error!(?token, error = %e, "session lookup failed")
        }
    }
    AuthError::Unauthenticated
}

/// Translation for paths that already hold a verified identity, where a
/// backend failure is an outage rather than a failed authentication.
fn unavailable(op: &str, error: TokenStoreError) -> AuthError {
    match error {
        TokenStoreError::Connection(e) => {
            warn!(op, error = %e, "session backend failure");
            AuthError::Unavailable
        }
        TokenStoreError::NotFound => AuthError::Unauthenticated,
        TokenStoreError::Internal(e) => {
            error!(op, error = %e, "session store error");
            AuthError::InternalError(op.to_string())
        }
    }
}

#[async_trait::async_trait]
impl SessionAuthenticator for RealSessionAuthenticator {
    async fn login(&self, request: LoginInput) -> Result<IssuedToken, AuthError> {
        let LoginInput {
            username,
            password,
            metadata,
        } = request;

        let subject_id = self
            .credential_verifier
            .verify(&username, &password)
            .await
            .map_err(|e| {
                error!(error = %e, "credential verification failed");
                AuthError::InternalError("credential verification".to_string())
            })?
            .ok_or_else(|| {
                info!(username = %username, "login rejected");
                AuthError::InvalidCredentials
            })?;

        let token = self
            .token_store
            .issue(&subject_id, None, metadata, self.deadline())
            .await
            .map_err(|e| unavailable("login", e))?;

        info!(subject = %subject_id, "login succeeded");
        Ok(token.into())
    }

    async fn authenticate(&self, token: &str) -> Result<SubjectId, AuthError> {
        let session = self.verified_session(token).await?;
        Ok(session.subject_id)
    }

    async fn refresh(&self, token: &str) -> Result<IssuedToken, AuthError> {
        let Some(presented) = TokenId::parse(token) else {
            debug!("malformed token presented for refresh");
            return Err(AuthError::Unauthenticated);
        };

        // Consuming makes the old token unusable before the new one exists, so
        // two racing refreshes cannot both succeed. If the issue below fails
        // the caller is left without a session and has to log in again.
        let session = self
            .token_store
            .consume(&presented, self.deadline())
            .await
            .map_err(|e| unauthenticated(&presented, e))?;

        let token = self
            .token_store
            .issue(&session.subject_id, None, session.metadata, self.deadline())
            .await
            .map_err(|e| unavailable("refresh", e))?;

        debug!(subject = %token.subject_id, old = ?presented, new = ?token.id, "session rotated");
        Ok(token.into())
    }

    async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let Some(token) = TokenId::parse(token) else {
            return Ok(());
        };
        self.token_store
            .revoke(&token, self.deadline())
            .await
            .map_err(|e| unavailable("logout", e))
    }

    async fn logout_all(&self, token: &str) -> Result<usize, AuthError> {
        let session = self.verified_session(token).await?;
        self.token_store
            .revoke_all_for_subject(&session.subject_id, self.deadline())
            .await
            .map_err(|e| unavailable("logout_all", e))
    }
}
