//! Appointment log: dated visits that reference the owner's documents.
//!
//! References are one-way. Deleting an appointment never touches the
//! documents it lists; deleting a document is handled by the store, which
//! strips the id from every appointment.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::RecordStore;
use crate::error::{CoreError, CoreResult};
use crate::models::{
    dedup_ids, to_storage_precision, Appointment, AppointmentChange, AppointmentFilter,
    AppointmentPatch, MAX_NAME_CHARS,
};
use crate::search::{filter_appointments, validate_date_range};

/// Request to create an appointment.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAppointment {
    pub title: String,
    pub date: DateTime<Utc>,
    pub location: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub document_ids: Vec<Uuid>,
}

pub struct AppointmentLog {
    store: Arc<dyn RecordStore>,
}

impl AppointmentLog {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn create(&self, owner_id: Uuid, req: NewAppointment) -> CoreResult<Appointment> {
        let title = validate_title(&req.title)?;
        let document_ids = dedup_ids(&req.document_ids);
        self.check_documents_owned(owner_id, &document_ids)?;

        let appt = Appointment {
            id: Uuid::new_v4(),
            owner_id,
            title,
            date: to_storage_precision(req.date),
            location: non_blank(req.location),
            notes: non_blank(req.notes),
            document_ids,
        };
        self.store.insert_appointment(&appt)?;
        tracing::info!(appointment_id = %appt.id, "Appointment created");
        Ok(appt)
    }

    pub fn get(&self, owner_id: Uuid, id: Uuid) -> CoreResult<Appointment> {
        match self.store.get_appointment(&id)? {
            Some(appt) if appt.owner_id == owner_id => Ok(appt),
            _ => Err(CoreError::not_found("Appointment")),
        }
    }

    /// Chronological.
    pub fn list(&self, owner_id: Uuid) -> CoreResult<Vec<Appointment>> {
        Ok(self.store.list_appointments_by_owner(&owner_id)?)
    }

    pub fn search(&self, owner_id: Uuid, filter: &AppointmentFilter) -> CoreResult<Vec<Appointment>> {
        validate_date_range(filter.start_date, filter.end_date)?;
        Ok(filter_appointments(self.list(owner_id)?, filter))
    }

    pub fn update(&self, owner_id: Uuid, id: Uuid, mut patch: AppointmentPatch) -> CoreResult<Appointment> {
        self.get(owner_id, id)?;

        if let Some(title) = &patch.title {
            patch.title = Some(validate_title(title)?);
        }
        if let Some(ids) = &patch.document_ids {
            self.check_documents_owned(owner_id, ids)?;
        }
        patch.location = patch.location.map(non_blank);
        patch.notes = patch.notes.map(non_blank);
        patch.date = patch.date.map(to_storage_precision);

        Ok(self
            .store
            .modify_appointment(&id, &AppointmentChange::Patch(patch))?)
    }

    pub fn delete(&self, owner_id: Uuid, id: Uuid) -> CoreResult<()> {
        self.get(owner_id, id)?;
        if !self.store.delete_appointment(&id)? {
            return Err(CoreError::not_found("Appointment"));
        }
        tracing::info!(appointment_id = %id, "Appointment deleted");
        Ok(())
    }

    /// Add a document reference. Attaching twice is a no-op.
    pub fn attach_document(&self, owner_id: Uuid, id: Uuid, document_id: Uuid) -> CoreResult<Appointment> {
        self.get(owner_id, id)?;
        self.check_documents_owned(owner_id, &[document_id])?;
        Ok(self
            .store
            .modify_appointment(&id, &AppointmentChange::Attach(document_id))?)
    }

    /// Remove a document reference. Detaching an absent id is a no-op.
    pub fn detach_document(&self, owner_id: Uuid, id: Uuid, document_id: Uuid) -> CoreResult<Appointment> {
        self.get(owner_id, id)?;
        Ok(self
            .store
            .modify_appointment(&id, &AppointmentChange::Detach(document_id))?)
    }

    fn check_documents_owned(&self, owner_id: Uuid, ids: &[Uuid]) -> CoreResult<()> {
        for id in ids {
            match self.store.get_document(id)? {
                Some(doc) if doc.owner_id == owner_id => {}
                _ => {
                    return Err(CoreError::Validation(format!(
                        "document {id} does not exist"
                    )))
                }
            }
        }
        Ok(())
    }
}

fn validate_title(raw: &str) -> CoreResult<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(CoreError::Validation("title must not be blank".into()));
    }
    if title.chars().count() > MAX_NAME_CHARS {
        return Err(CoreError::Validation(format!(
            "title must be at most {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::enums::{ExtractionStatus, SummaryStatus};
    use crate::models::Document;
    use chrono::Duration;

    fn seed_doc(store: &dyn RecordStore, owner: Uuid) -> Uuid {
        let doc = Document {
            id: Uuid::new_v4(),
            owner_id: owner,
            name: "Referral".into(),
            category: String::new(),
            tags: vec![],
            file_ref: "r.txt".into(),
            uploaded_at: Utc::now(),
            extracted_text: None,
            extraction_status: ExtractionStatus::Pending,
            extraction_error: None,
            summary: None,
            summary_status: SummaryStatus::None,
            summary_error: None,
        };
        store.insert_document(&doc).unwrap();
        doc.id
    }

    fn new_appt(title: &str, date: DateTime<Utc>, docs: Vec<Uuid>) -> NewAppointment {
        NewAppointment {
            title: title.into(),
            date,
            location: Some("  ".into()),
            notes: Some("Bring medication list".into()),
            document_ids: docs,
        }
    }

    fn setup() -> (AppointmentLog, Arc<dyn RecordStore>, Uuid) {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        (AppointmentLog::new(store.clone()), store, Uuid::new_v4())
    }

    #[test]
    fn create_dedups_and_blanks_become_none() {
        let (log, store, owner) = setup();
        let d = seed_doc(store.as_ref(), owner);
        let appt = log
            .create(owner, new_appt(" Cardiology ", Utc::now(), vec![d, d]))
            .unwrap();
        assert_eq!(appt.title, "Cardiology");
        assert_eq!(appt.document_ids, vec![d]);
        assert_eq!(appt.location, None);
    }

    #[test]
    fn foreign_document_reference_rejected() {
        let (log, store, owner) = setup();
        let foreign = seed_doc(store.as_ref(), Uuid::new_v4());
        assert!(matches!(
            log.create(owner, new_appt("GP", Utc::now(), vec![foreign])),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            log.create(owner, new_appt("GP", Utc::now(), vec![Uuid::new_v4()])),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn list_is_chronological() {
        let (log, _, owner) = setup();
        let now = Utc::now();
        log.create(owner, new_appt("later", now + Duration::days(3), vec![])).unwrap();
        log.create(owner, new_appt("sooner", now + Duration::days(1), vec![])).unwrap();
        let titles: Vec<_> = log.list(owner).unwrap().into_iter().map(|a| a.title).collect();
        assert_eq!(titles, vec!["sooner", "later"]);
    }

    #[test]
    fn attach_and_detach_are_idempotent() {
        let (log, store, owner) = setup();
        let d = seed_doc(store.as_ref(), owner);
        let appt = log.create(owner, new_appt("GP", Utc::now(), vec![])).unwrap();

        log.attach_document(owner, appt.id, d).unwrap();
        let appt = log.attach_document(owner, appt.id, d).unwrap();
        assert_eq!(appt.document_ids, vec![d]);

        log.detach_document(owner, appt.id, d).unwrap();
        let appt = log.detach_document(owner, appt.id, d).unwrap();
        assert!(appt.document_ids.is_empty());
        assert!(log.get(owner, appt.id).unwrap().document_ids.is_empty());
    }

    #[test]
    fn delete_leaves_documents_intact() {
        let (log, store, owner) = setup();
        let d = seed_doc(store.as_ref(), owner);
        let appt = log.create(owner, new_appt("GP", Utc::now(), vec![d])).unwrap();

        log.delete(owner, appt.id).unwrap();
        assert!(store.get_document(&d).unwrap().is_some());
        assert!(matches!(log.get(owner, appt.id), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn deleting_document_removes_reference() {
        let (log, store, owner) = setup();
        let d = seed_doc(store.as_ref(), owner);
        let appt = log.create(owner, new_appt("GP", Utc::now(), vec![d])).unwrap();

        store.delete_document(&d).unwrap();
        assert!(log.get(owner, appt.id).unwrap().document_ids.is_empty());
    }

    #[test]
    fn concurrent_attaches_all_land() {
        let (log, store, owner) = setup();
        let log = Arc::new(log);
        let appt = log.create(owner, new_appt("GP", Utc::now(), vec![])).unwrap();
        let docs: Vec<Uuid> = (0..8).map(|_| seed_doc(store.as_ref(), owner)).collect();

        let handles: Vec<_> = docs
            .iter()
            .map(|&d| {
                let log = log.clone();
                std::thread::spawn(move || log.attach_document(owner, appt.id, d).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut attached = log.get(owner, appt.id).unwrap().document_ids;
        attached.sort();
        let mut expected = docs;
        expected.sort();
        assert_eq!(attached, expected);
    }

    #[test]
    fn update_after_document_delete_does_not_restore_reference() {
        let (log, store, owner) = setup();
        let d = seed_doc(store.as_ref(), owner);
        let appt = log.create(owner, new_appt("GP", Utc::now(), vec![d])).unwrap();

        store.delete_document(&d).unwrap();
        let patch = AppointmentPatch {
            notes: Some(Some("Ask about dosage".into())),
            ..Default::default()
        };
        let updated = log.update(owner, appt.id, patch).unwrap();
        assert!(updated.document_ids.is_empty());
        assert!(log.get(owner, appt.id).unwrap().document_ids.is_empty());
    }

    #[test]
    fn update_is_partial_and_owner_scoped() {
        let (log, _, owner) = setup();
        let appt = log.create(owner, new_appt("GP", Utc::now(), vec![])).unwrap();

        let patch: AppointmentPatch = serde_json::from_str(r#"{"notes": null}"#).unwrap();
        let updated = log.update(owner, appt.id, patch).unwrap();
        assert_eq!(updated.title, "GP");
        assert_eq!(updated.notes, None);

        let stranger = Uuid::new_v4();
        assert!(matches!(
            log.update(stranger, appt.id, AppointmentPatch::default()),
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(log.delete(stranger, appt.id), Err(CoreError::NotFound(_))));
    }
}
