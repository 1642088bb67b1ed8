use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareLink {
    pub id: Uuid,
    pub document_id: Uuid,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_accesses: Option<u32>,
    pub access_count: u32,
}

impl ShareLink {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_accesses
            .is_some_and(|max| self.access_count >= max)
    }

    /// Whether one more resolution is permitted at `now`.
    pub fn is_resolvable(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && !self.is_exhausted()
    }
}
