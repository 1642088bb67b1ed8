pub mod memory;
pub mod repository;
pub mod sqlite;
pub mod store;

pub use memory::MemoryStore;
pub use sqlite::*;
pub use store::{RecordStore, SqliteStore};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("Corrupt column {column}: {reason}")]
    CorruptValue { column: &'static str, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl DatabaseError {
    pub(crate) fn not_found(entity_type: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }
}
