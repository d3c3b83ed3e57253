use crate::domain_model::SubjectId;

#[derive(Debug, thiserror::Error)]
#[error("credential backend error: {0}")]
pub struct VerifierError(pub String);

/// Checks raw login credentials. Owned by the identity side of the system;
/// sessions only consume the verdict.
#[async_trait::async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// `Ok(None)` when the credentials are rejected, for whatever reason.
    async fn verify(&self, username: &str, password: &str)
    -> Result<Option<SubjectId>, VerifierError>;
}
