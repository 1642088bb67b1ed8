//! In-memory search over a caller's documents and appointments.
//!
//! Filters are conjunctive and preserve input order. Date bounds are UTC
//! calendar days: the start day from 00:00:00.000, the end day through
//! 23:59:59.999, both inclusive.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::db::RecordStore;
use crate::error::{CoreError, CoreResult};
use crate::models::{Appointment, AppointmentFilter, Document, DocumentFilter};

/// Reject a range whose start falls after its end.
pub fn validate_date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> CoreResult<()> {
    match (start, end) {
        (Some(s), Some(e)) if s > e => Err(CoreError::Validation(
            "startDate must not be after endDate".into(),
        )),
        _ => Ok(()),
    }
}

/// Search the owner's documents, newest upload first.
pub fn search_documents(
    store: &dyn RecordStore,
    owner_id: Uuid,
    filter: &DocumentFilter,
) -> CoreResult<Vec<Document>> {
    validate_date_range(filter.start_date, filter.end_date)?;
    let docs = store.list_documents_by_owner(&owner_id)?;
    Ok(filter_documents(docs, filter))
}

pub fn filter_documents(docs: Vec<Document>, filter: &DocumentFilter) -> Vec<Document> {
    let query = normalized_query(filter.query.as_deref());
    let window = DateWindow::new(filter.start_date, filter.end_date);

    docs.into_iter()
        .filter(|doc| {
            if let Some(q) = &query {
                let in_name = doc.name.to_lowercase().contains(q);
                let in_text = doc
                    .extracted_text
                    .as_deref()
                    .is_some_and(|t| t.to_lowercase().contains(q));
                if !in_name && !in_text {
                    return false;
                }
            }
            if let Some(category) = &filter.category {
                if &doc.category != category {
                    return false;
                }
            }
            filter.tags.iter().all(|tag| doc.has_tag(tag)) && window.contains(&doc.uploaded_at)
        })
        .collect()
}

/// Title, notes or location match; input is expected in date order.
pub fn filter_appointments(appts: Vec<Appointment>, filter: &AppointmentFilter) -> Vec<Appointment> {
    let query = normalized_query(filter.query.as_deref());
    let window = DateWindow::new(filter.start_date, filter.end_date);

    appts
        .into_iter()
        .filter(|appt| {
            let matches_query = query.as_ref().map_or(true, |q| {
                [Some(appt.title.as_str()), appt.notes.as_deref(), appt.location.as_deref()]
                    .into_iter()
                    .flatten()
                    .any(|field| field.to_lowercase().contains(q))
            });
            matches_query && window.contains(&appt.date)
        })
        .collect()
}

fn normalized_query(query: Option<&str>) -> Option<String> {
    query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase)
}

struct DateWindow {
    from: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
}

impl DateWindow {
    fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            from: start
                .and_then(|d| d.and_hms_milli_opt(0, 0, 0, 0))
                .map(|dt| Utc.from_utc_datetime(&dt)),
            until: end
                .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999))
                .map(|dt| Utc.from_utc_datetime(&dt)),
        }
    }

    fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| *ts >= from) && self.until.map_or(true, |until| *ts <= until)
    }
}
