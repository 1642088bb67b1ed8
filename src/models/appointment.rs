use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub date: DateTime<Utc>,
    pub location: Option<String>,
    pub notes: Option<String>,
    /// Referenced documents. Back-references only: the appointment does not own them.
    pub document_ids: Vec<Uuid>,
}

impl Appointment {
    /// Add a document reference. Returns false if it was already present.
    pub fn attach(&mut self, document_id: Uuid) -> bool {
        if self.document_ids.contains(&document_id) {
            return false;
        }
        self.document_ids.push(document_id);
        true
    }

    /// Remove a document reference. Returns false if it was not present.
    pub fn detach(&mut self, document_id: &Uuid) -> bool {
        let before = self.document_ids.len();
        self.document_ids.retain(|id| id != document_id);
        before != self.document_ids.len()
    }
}

/// Partial update for an appointment. Doubly-optional fields clear with `Some(None)`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentPatch {
    pub title: Option<String>,
    pub date: Option<DateTime<Utc>>,
    #[serde(default, with = "double_option")]
    pub location: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    pub notes: Option<Option<String>>,
    pub document_ids: Option<Vec<Uuid>>,
}

impl AppointmentPatch {
    pub fn apply(&self, appt: &mut Appointment) {
        if let Some(title) = &self.title {
            appt.title = title.clone();
        }
        if let Some(date) = self.date {
            appt.date = date;
        }
        if let Some(location) = &self.location {
            appt.location = location.clone();
        }
        if let Some(notes) = &self.notes {
            appt.notes = notes.clone();
        }
        if let Some(ids) = &self.document_ids {
            appt.document_ids = dedup_ids(ids);
        }
    }
}

/// One edit applied by the store while it holds its lock, so a concurrent
/// document delete or attach is never overwritten by a stale copy.
#[derive(Debug, Clone)]
pub enum AppointmentChange {
    Patch(AppointmentPatch),
    Attach(Uuid),
    Detach(Uuid),
}

impl AppointmentChange {
    /// Returns false when the appointment is left as it was.
    pub fn apply(&self, appt: &mut Appointment) -> bool {
        match self {
            Self::Patch(patch) => {
                patch.apply(appt);
                true
            }
            Self::Attach(document_id) => appt.attach(*document_id),
            Self::Detach(document_id) => appt.detach(document_id),
        }
    }
}

/// Keep first occurrence of each id.
pub fn dedup_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(*id);
        }
    }
    out
}

/// Distinguishes an absent JSON field (`None`) from an explicit `null` (`Some(None)`).
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "Cardiology follow-up".into(),
            date: Utc::now(),
            location: Some("Clinic B".into()),
            notes: None,
            document_ids: Vec::new(),
        }
    }

    #[test]
    fn attach_is_idempotent() {
        let mut appt = sample();
        let doc = Uuid::new_v4();
        assert!(appt.attach(doc));
        assert!(!appt.attach(doc));
        assert_eq!(appt.document_ids, vec![doc]);
        assert!(appt.detach(&doc));
        assert!(!appt.detach(&doc));
    }

    #[test]
    fn change_reports_whether_anything_moved() {
        let mut appt = sample();
        let doc = Uuid::new_v4();
        assert!(AppointmentChange::Attach(doc).apply(&mut appt));
        assert!(!AppointmentChange::Attach(doc).apply(&mut appt));
        assert!(AppointmentChange::Detach(doc).apply(&mut appt));
        assert!(!AppointmentChange::Detach(doc).apply(&mut appt));
        assert!(AppointmentChange::Patch(AppointmentPatch::default()).apply(&mut appt));
    }

    #[test]
    fn patch_distinguishes_null_from_absent() {
        let patch: AppointmentPatch =
            serde_json::from_str(r#"{"location": null, "title": "New"}"#).unwrap();
        assert_eq!(patch.location, Some(None));
        assert_eq!(patch.notes, None);

        let mut appt = sample();
        patch.apply(&mut appt);
        assert_eq!(appt.title, "New");
        assert_eq!(appt.location, None);
    }

    #[test]
    fn patch_dedups_document_ids() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut appt = sample();
        AppointmentPatch {
            document_ids: Some(vec![a, b, a]),
            ..Default::default()
        }
        .apply(&mut appt);
        assert_eq!(appt.document_ids, vec![a, b]);
    }
}
