use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;

/// Server-side session record.
///
/// `id` is the SHA-256 digest (hex) of the token handed to the client, so a
/// leaked session table cannot be replayed.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Session {
    pub id: String,
    pub identity_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: String, identity_id: String, ttl: Duration) -> Self {
        let issued_at = Utc::now();
        Self {
            id,
            identity_id,
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Locally verifiable credential. Never serialized to clients.
#[derive(Debug, Clone, FromRow)]
pub struct CredentialRecord {
    pub identity_id: String,
    pub email: String,
    pub password_hash: String,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn new(identity_id: String, email: &str, password_hash: String) -> Self {
        Self {
            identity_id,
            email: email.trim().to_lowercase(),
            password_hash,
            updated_at: Utc::now(),
        }
    }
}
