use super::SubjectId;
use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of random bytes behind a token identifier.
pub const TOKEN_BYTES: usize = 32;

pub type Metadata = BTreeMap<String, String>;

/// Opaque session token: `TOKEN_BYTES` bytes from the OS CSPRNG, hex encoded.
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        TokenId(hex::encode(bytes))
    }

    /// Accepts only well-formed identifiers, so arbitrary client input never
    /// reaches the store key space.
    pub fn parse(s: &str) -> Option<Self> {
        let well_formed = s.len() == TOKEN_BYTES * 2
            && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        well_formed.then(|| TokenId(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Only a prefix, tokens are bearer credentials.
impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.0.get(..8).unwrap_or(&self.0);
        write!(f, "TokenId({}…)", prefix)
    }
}

/// The record stored under `session:<token>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub subject_id: SubjectId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl Session {
    /// Lifetime the session was issued with. Sliding expiration re-arms the
    /// store TTL with this value.
    pub fn lifetime(&self) -> chrono::Duration {
        self.expires_at - self.issued_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub id: TokenId,
    pub subject_id: SubjectId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub metadata: Metadata,
}

impl Token {
    pub fn from_session(id: TokenId, session: Session) -> Self {
        Token {
            id,
            subject_id: session.subject_id,
            issued_at: session.issued_at,
            expires_at: session.expires_at,
            metadata: session.metadata,
        }
    }

    pub fn session(&self) -> Session {
        Session {
            subject_id: self.subject_id.clone(),
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            metadata: self.metadata.clone(),
        }
    }
}
