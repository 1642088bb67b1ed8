//! Domain error taxonomy shared by the pipeline, share links, appointments
//! and accounts.
//!
//! `NotFound` covers both "absent" and "owned by someone else" so callers
//! cannot probe for other users' ids.

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Carries the full client-facing message.
    #[error("{0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Invalid credentials")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(DatabaseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// `"<what> not found"`.
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }
}

impl From<DatabaseError> for CoreError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, .. } => Self::not_found(&entity_type),
            other => Self::Database(other),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Failures that stop the server from coming up.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
