use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Account record. Never serialized with its secrets.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub totp_secret: Option<String>,
    pub totp_enabled: bool,
    pub totp_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Public view of a user returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub totp_enabled: bool,
    pub totp_verified: bool,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            totp_enabled: user.totp_enabled,
            totp_verified: user.totp_verified,
        }
    }
}
