use crate::domain_model::SubjectId;
use crate::domain_port::*;
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use std::collections::HashMap;

pub struct Argon2PasswordHasher;

impl Argon2PasswordHasher {
    pub fn hash_password(password: &str) -> Result<String, VerifierError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| VerifierError(e.to_string()))?
            .to_string();
        Ok(hash)
    }

    pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, VerifierError> {
        let parsed = PasswordHash::new(password_hash)
            .map_err(|e| VerifierError(format!("invalid PHC hash: {}", e)))?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(VerifierError(format!("verify error: {}", e))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StaticUser {
    pub username: String,
    pub subject_id: SubjectId,
    pub password_hash: String,
}

/// Fixed set of accounts loaded at startup, each with an Argon2 PHC hash.
pub struct StaticCredentialVerifier {
    users: HashMap<String, (SubjectId, String)>,
    // Checked for unknown usernames so they cost as much as a wrong password.
    decoy_hash: String,
}

impl StaticCredentialVerifier {
    pub fn new(users: impl IntoIterator<Item = StaticUser>) -> Result<Self, VerifierError> {
        let mut map = HashMap::new();
        for user in users {
            PasswordHash::new(&user.password_hash).map_err(|e| {
                VerifierError(format!("invalid PHC hash for {}: {}", user.username, e))
            })?;
            map.insert(user.username, (user.subject_id, user.password_hash));
        }
        Ok(StaticCredentialVerifier {
            users: map,
            decoy_hash: Argon2PasswordHasher::hash_password("decoy")?,
        })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait::async_trait]
impl CredentialVerifier for StaticCredentialVerifier {
    async fn verify(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<SubjectId>, VerifierError> {
        let (subject_id, hash) = match self.users.get(username) {
            Some((subject_id, hash)) => (Some(subject_id.clone()), hash.clone()),
            None => (None, self.decoy_hash.clone()),
        };
        let password = password.to_string();
        let matches =
            tokio::task::spawn_blocking(move || Argon2PasswordHasher::verify_password(&password, &hash))
                .await
                .map_err(|e| VerifierError(e.to_string()))??;

        Ok(subject_id.filter(|_| matches))
    }
}
