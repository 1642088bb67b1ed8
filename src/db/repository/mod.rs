//! Repository layer: entity-scoped SQLite operations.
//!
//! Free functions over a borrowed `Connection`. `SqliteStore` wraps them
//! behind the `RecordStore` trait and owns the connection lock.

mod appointment;
mod document;
mod share_link;
mod user;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use super::DatabaseError;

pub use appointment::*;
pub use document::*;
pub use share_link::*;
pub use user::*;

/// Fixed-width RFC 3339 (UTC, millisecond precision) so text ordering matches time ordering.
pub(crate) fn to_db_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_db_time(column: &'static str, raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::CorruptValue {
            column,
            reason: e.to_string(),
        })
}

pub(crate) fn parse_uuid(column: &'static str, raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::CorruptValue {
        column,
        reason: e.to_string(),
    })
}

pub(crate) fn to_json<T: serde::Serialize>(column: &'static str, value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::CorruptValue {
        column,
        reason: e.to_string(),
    })
}

pub(crate) fn from_json<T: serde::de::DeserializeOwned>(
    column: &'static str,
    raw: &str,
) -> Result<T, DatabaseError> {
    serde_json::from_str(raw).map_err(|e| DatabaseError::CorruptValue {
        column,
        reason: e.to_string(),
    })
}
