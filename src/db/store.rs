//! Storage capability consumed by the pipeline, share-link manager and API.
//!
//! `RecordStore` is the single seam between business logic and persistence.
//! `SqliteStore` is the production backend; `MemoryStore` backs unit tests.
//! Both serialize every call, which is what makes `claim_*` and
//! `consume_share_link` atomic check-and-set operations.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::repository;
use super::sqlite::{open_database, open_memory_database};
use super::DatabaseError;
use crate::models::*;

pub trait RecordStore: Send + Sync {
    // ── Documents ───────────────────────────────────────────
    fn insert_document(&self, doc: &Document) -> Result<(), DatabaseError>;
    fn get_document(&self, id: &Uuid) -> Result<Option<Document>, DatabaseError>;
    /// Newest upload first.
    fn list_documents_by_owner(&self, owner_id: &Uuid) -> Result<Vec<Document>, DatabaseError>;
    /// Apply a partial update and return the stored result.
    fn update_document(&self, id: &Uuid, patch: &DocumentPatch) -> Result<Document, DatabaseError>;
    /// Delete a document with its share links and appointment references.
    fn delete_document(&self, id: &Uuid) -> Result<Option<Document>, DatabaseError>;
    /// Enter extraction `processing`. `false` if already processing or summarizing.
    fn claim_extraction(&self, id: &Uuid) -> Result<bool, DatabaseError>;
    /// Enter summary `processing`. `false` unless extraction completed with usable text
    /// and no summary is in flight.
    fn claim_summary(&self, id: &Uuid) -> Result<bool, DatabaseError>;

    // ── Appointments ────────────────────────────────────────
    fn insert_appointment(&self, appt: &Appointment) -> Result<(), DatabaseError>;
    fn get_appointment(&self, id: &Uuid) -> Result<Option<Appointment>, DatabaseError>;
    /// Chronological.
    fn list_appointments_by_owner(&self, owner_id: &Uuid) -> Result<Vec<Appointment>, DatabaseError>;
    /// Apply one change atomically. References to documents the owner no
    /// longer has are dropped in the same step.
    fn modify_appointment(&self, id: &Uuid, change: &AppointmentChange) -> Result<Appointment, DatabaseError>;
    fn delete_appointment(&self, id: &Uuid) -> Result<bool, DatabaseError>;

    // ── Share links ─────────────────────────────────────────
    fn insert_share_link(&self, link: &ShareLink) -> Result<(), DatabaseError>;
    fn get_share_link(&self, id: &Uuid) -> Result<Option<ShareLink>, DatabaseError>;
    /// Newest first.
    fn list_share_links_for_document(&self, document_id: &Uuid) -> Result<Vec<ShareLink>, DatabaseError>;
    /// Atomically validate and count one access.
    fn consume_share_link(&self, token: &str, now: &DateTime<Utc>) -> Result<Option<ShareLink>, DatabaseError>;
    fn delete_share_link(&self, id: &Uuid) -> Result<bool, DatabaseError>;
    fn purge_inactive_share_links(&self, now: &DateTime<Utc>) -> Result<usize, DatabaseError>;

    // ── Users ───────────────────────────────────────────────
    fn insert_user(&self, user: &User) -> Result<(), DatabaseError>;
    fn get_user(&self, id: &Uuid) -> Result<Option<User>, DatabaseError>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DatabaseError>;
}

/// SQLite-backed store holding one connection behind a mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the database file. Stages a previous process left in
    /// `processing` are failed so they can be retried.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let conn = open_database(path)?;
        let failed = repository::fail_interrupted_stages(&conn)?;
        if failed > 0 {
            tracing::warn!(count = failed, "Failed pipeline stages interrupted by shutdown");
        }
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_memory_database()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }
}

impl RecordStore for SqliteStore {
    fn insert_document(&self, doc: &Document) -> Result<(), DatabaseError> {
        repository::insert_document(&*self.conn()?, doc)
    }

    fn get_document(&self, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
        repository::get_document(&*self.conn()?, id)
    }

    fn list_documents_by_owner(&self, owner_id: &Uuid) -> Result<Vec<Document>, DatabaseError> {
        repository::list_documents_by_owner(&*self.conn()?, owner_id)
    }

    fn update_document(&self, id: &Uuid, patch: &DocumentPatch) -> Result<Document, DatabaseError> {
        repository::patch_document(&*self.conn()?, id, patch)
    }

    fn delete_document(&self, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
        repository::delete_document(&*self.conn()?, id)
    }

    fn claim_extraction(&self, id: &Uuid) -> Result<bool, DatabaseError> {
        repository::claim_extraction(&*self.conn()?, id)
    }

    fn claim_summary(&self, id: &Uuid) -> Result<bool, DatabaseError> {
        repository::claim_summary(&*self.conn()?, id)
    }

    fn insert_appointment(&self, appt: &Appointment) -> Result<(), DatabaseError> {
        repository::insert_appointment(&*self.conn()?, appt)
    }

    fn get_appointment(&self, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
        repository::get_appointment(&*self.conn()?, id)
    }

    fn list_appointments_by_owner(&self, owner_id: &Uuid) -> Result<Vec<Appointment>, DatabaseError> {
        repository::list_appointments_by_owner(&*self.conn()?, owner_id)
    }

    fn modify_appointment(&self, id: &Uuid, change: &AppointmentChange) -> Result<Appointment, DatabaseError> {
        repository::modify_appointment(&*self.conn()?, id, change)
    }

    fn delete_appointment(&self, id: &Uuid) -> Result<bool, DatabaseError> {
        repository::delete_appointment(&*self.conn()?, id)
    }

    fn insert_share_link(&self, link: &ShareLink) -> Result<(), DatabaseError> {
        repository::insert_share_link(&*self.conn()?, link)
    }

    fn get_share_link(&self, id: &Uuid) -> Result<Option<ShareLink>, DatabaseError> {
        repository::get_share_link(&*self.conn()?, id)
    }

    fn list_share_links_for_document(&self, document_id: &Uuid) -> Result<Vec<ShareLink>, DatabaseError> {
        repository::list_share_links_for_document(&*self.conn()?, document_id)
    }

    fn consume_share_link(&self, token: &str, now: &DateTime<Utc>) -> Result<Option<ShareLink>, DatabaseError> {
        repository::consume_share_link(&*self.conn()?, token, now)
    }

    fn delete_share_link(&self, id: &Uuid) -> Result<bool, DatabaseError> {
        repository::delete_share_link(&*self.conn()?, id)
    }

    fn purge_inactive_share_links(&self, now: &DateTime<Utc>) -> Result<usize, DatabaseError> {
        repository::purge_inactive_share_links(&*self.conn()?, now)
    }

    fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        repository::insert_user(&*self.conn()?, user)
    }

    fn get_user(&self, id: &Uuid) -> Result<Option<User>, DatabaseError> {
        repository::get_user(&*self.conn()?, id)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DatabaseError> {
        repository::get_user_by_username(&*self.conn()?, username)
    }
}
