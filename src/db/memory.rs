//! In-memory `RecordStore` used by unit tests and throwaway runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::store::RecordStore;
use super::DatabaseError;
use crate::models::enums::{ExtractionStatus, SummaryStatus};
use crate::models::*;

#[derive(Default)]
struct Tables {
    documents: HashMap<Uuid, Document>,
    appointments: HashMap<Uuid, Appointment>,
    share_links: HashMap<Uuid, ShareLink>,
    users: HashMap<Uuid, User>,
}

/// Mutex-guarded maps. Every trait call holds the lock for its whole body.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, DatabaseError> {
        self.tables.lock().map_err(|_| DatabaseError::LockPoisoned)
    }
}

impl RecordStore for MemoryStore {
    fn insert_document(&self, doc: &Document) -> Result<(), DatabaseError> {
        let mut t = self.tables()?;
        if t.documents.contains_key(&doc.id) {
            return Err(DatabaseError::ConstraintViolation(format!("document {} exists", doc.id)));
        }
        t.documents.insert(doc.id, doc.clone());
        Ok(())
    }

    fn get_document(&self, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
        Ok(self.tables()?.documents.get(id).cloned())
    }

    fn list_documents_by_owner(&self, owner_id: &Uuid) -> Result<Vec<Document>, DatabaseError> {
        let t = self.tables()?;
        let mut docs: Vec<Document> = t
            .documents
            .values()
            .filter(|d| &d.owner_id == owner_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(docs)
    }

    fn update_document(&self, id: &Uuid, patch: &DocumentPatch) -> Result<Document, DatabaseError> {
        let mut t = self.tables()?;
        let doc = t
            .documents
            .get_mut(id)
            .ok_or_else(|| DatabaseError::not_found("Document", id))?;
        patch.apply(doc);
        Ok(doc.clone())
    }

    fn delete_document(&self, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
        let mut t = self.tables()?;
        let Some(doc) = t.documents.remove(id) else {
            return Ok(None);
        };
        t.share_links.retain(|_, link| &link.document_id != id);
        for appt in t.appointments.values_mut() {
            if appt.owner_id == doc.owner_id {
                appt.detach(id);
            }
        }
        Ok(Some(doc))
    }

    fn claim_extraction(&self, id: &Uuid) -> Result<bool, DatabaseError> {
        let mut t = self.tables()?;
        let Some(doc) = t.documents.get_mut(id) else {
            return Ok(false);
        };
        if doc.extraction_status == ExtractionStatus::Processing
            || doc.summary_status == SummaryStatus::Processing
        {
            return Ok(false);
        }
        doc.extraction_status = ExtractionStatus::Processing;
        doc.extraction_error = None;
        Ok(true)
    }

    fn claim_summary(&self, id: &Uuid) -> Result<bool, DatabaseError> {
        let mut t = self.tables()?;
        let Some(doc) = t.documents.get_mut(id) else {
            return Ok(false);
        };
        if doc.summary_status == SummaryStatus::Processing
            || doc.extraction_status != ExtractionStatus::Completed
            || doc.usable_text().is_none()
        {
            return Ok(false);
        }
        doc.summary_status = SummaryStatus::Processing;
        doc.summary_error = None;
        Ok(true)
    }

    fn insert_appointment(&self, appt: &Appointment) -> Result<(), DatabaseError> {
        self.tables()?.appointments.insert(appt.id, appt.clone());
        Ok(())
    }

    fn get_appointment(&self, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
        Ok(self.tables()?.appointments.get(id).cloned())
    }

    fn list_appointments_by_owner(&self, owner_id: &Uuid) -> Result<Vec<Appointment>, DatabaseError> {
        let t = self.tables()?;
        let mut appts: Vec<Appointment> = t
            .appointments
            .values()
            .filter(|a| &a.owner_id == owner_id)
            .cloned()
            .collect();
        appts.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(appts)
    }

    fn modify_appointment(&self, id: &Uuid, change: &AppointmentChange) -> Result<Appointment, DatabaseError> {
        let mut t = self.tables()?;
        let Tables {
            documents,
            appointments,
            ..
        } = &mut *t;
        let appt = appointments
            .get_mut(id)
            .ok_or_else(|| DatabaseError::not_found("Appointment", id))?;
        if change.apply(appt) {
            let owner_id = appt.owner_id;
            appt.document_ids.retain(|doc_id| {
                documents
                    .get(doc_id)
                    .is_some_and(|doc| doc.owner_id == owner_id)
            });
        }
        Ok(appt.clone())
    }

    fn delete_appointment(&self, id: &Uuid) -> Result<bool, DatabaseError> {
        Ok(self.tables()?.appointments.remove(id).is_some())
    }

    fn insert_share_link(&self, link: &ShareLink) -> Result<(), DatabaseError> {
        let mut t = self.tables()?;
        if !t.documents.contains_key(&link.document_id) {
            return Err(DatabaseError::ConstraintViolation(format!(
                "share link references missing document {}",
                link.document_id
            )));
        }
        if t.share_links.values().any(|l| l.token == link.token) {
            return Err(DatabaseError::ConstraintViolation("duplicate share token".into()));
        }
        t.share_links.insert(link.id, link.clone());
        Ok(())
    }

    fn get_share_link(&self, id: &Uuid) -> Result<Option<ShareLink>, DatabaseError> {
        Ok(self.tables()?.share_links.get(id).cloned())
    }

    fn list_share_links_for_document(&self, document_id: &Uuid) -> Result<Vec<ShareLink>, DatabaseError> {
        let t = self.tables()?;
        let mut links: Vec<ShareLink> = t
            .share_links
            .values()
            .filter(|l| &l.document_id == document_id)
            .cloned()
            .collect();
        links.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(links)
    }

    fn consume_share_link(&self, token: &str, now: &DateTime<Utc>) -> Result<Option<ShareLink>, DatabaseError> {
        let mut t = self.tables()?;
        let Some(link) = t.share_links.values_mut().find(|l| l.token == token) else {
            return Ok(None);
        };
        if !link.is_resolvable(*now) {
            return Ok(None);
        }
        link.access_count += 1;
        Ok(Some(link.clone()))
    }

    fn delete_share_link(&self, id: &Uuid) -> Result<bool, DatabaseError> {
        Ok(self.tables()?.share_links.remove(id).is_some())
    }

    fn purge_inactive_share_links(&self, now: &DateTime<Utc>) -> Result<usize, DatabaseError> {
        let mut t = self.tables()?;
        let before = t.share_links.len();
        t.share_links.retain(|_, link| link.is_resolvable(*now));
        Ok(before - t.share_links.len())
    }

    fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        let mut t = self.tables()?;
        if t.users.values().any(|u| u.username == user.username) {
            return Err(DatabaseError::ConstraintViolation(format!(
                "username '{}' already exists",
                user.username
            )));
        }
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    fn get_user(&self, id: &Uuid) -> Result<Option<User>, DatabaseError> {
        Ok(self.tables()?.users.get(id).cloned())
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DatabaseError> {
        Ok(self
            .tables()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }
}
