use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{from_json, parse_db_time, parse_uuid, to_db_time, to_json};
use crate::db::DatabaseError;
use crate::models::{Appointment, AppointmentChange};

const APPOINTMENT_COLUMNS: &str = "id, owner_id, title, date, location, notes, document_ids";

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO appointments (id, owner_id, title, date, location, notes, document_ids)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            appt.id.to_string(),
            appt.owner_id.to_string(),
            appt.title,
            to_db_time(&appt.date),
            appt.location,
            appt.notes,
            to_json("document_ids", &appt.document_ids)?,
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
    let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], read_appointment_row)
        .optional()?;
    row.map(appointment_from_row).transpose()
}

/// All appointments of one owner in chronological order.
pub fn list_appointments_by_owner(
    conn: &Connection,
    owner_id: &Uuid,
) -> Result<Vec<Appointment>, DatabaseError> {
    let sql = format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE owner_id = ?1 ORDER BY date ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner_id.to_string()], read_appointment_row)?;

    let mut appts = Vec::new();
    for row in rows {
        appts.push(appointment_from_row(row?)?);
    }
    Ok(appts)
}

pub fn update_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE appointments SET title = ?2, date = ?3, location = ?4, notes = ?5, document_ids = ?6
         WHERE id = ?1",
        params![
            appt.id.to_string(),
            appt.title,
            to_db_time(&appt.date),
            appt.location,
            appt.notes,
            to_json("document_ids", &appt.document_ids)?,
        ],
    )?;
    if rows == 0 {
        return Err(DatabaseError::not_found("Appointment", appt.id));
    }
    Ok(())
}

/// Apply one change inside a transaction. References to documents that no
/// longer exist under the appointment's owner are dropped before writing.
pub fn modify_appointment(
    conn: &Connection,
    id: &Uuid,
    change: &AppointmentChange,
) -> Result<Appointment, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let mut appt =
        get_appointment(&tx, id)?.ok_or_else(|| DatabaseError::not_found("Appointment", id))?;
    if change.apply(&mut appt) {
        retain_owned_documents(&tx, &mut appt)?;
        update_appointment(&tx, &appt)?;
    }
    tx.commit()?;
    Ok(appt)
}

fn retain_owned_documents(conn: &Connection, appt: &mut Appointment) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare("SELECT 1 FROM documents WHERE id = ?1 AND owner_id = ?2")?;
    let mut kept = Vec::with_capacity(appt.document_ids.len());
    for document_id in &appt.document_ids {
        if stmt.exists(params![document_id.to_string(), appt.owner_id.to_string()])? {
            kept.push(*document_id);
        }
    }
    appt.document_ids = kept;
    Ok(())
}

/// Delete an appointment row. Referenced documents are untouched.
pub fn delete_appointment(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let rows = conn.execute("DELETE FROM appointments WHERE id = ?1", params![id.to_string()])?;
    Ok(rows > 0)
}

/// Remove `document_id` from every appointment of `owner_id`. Returns how many changed.
pub fn detach_document_everywhere(
    conn: &Connection,
    owner_id: &Uuid,
    document_id: &Uuid,
) -> Result<usize, DatabaseError> {
    let mut changed = 0;
    for mut appt in list_appointments_by_owner(conn, owner_id)? {
        if appt.detach(document_id) {
            update_appointment(conn, &appt)?;
            changed += 1;
        }
    }
    Ok(changed)
}

struct AppointmentRow {
    id: String,
    owner_id: String,
    title: String,
    date: String,
    location: Option<String>,
    notes: Option<String>,
    document_ids: String,
}

fn read_appointment_row(row: &rusqlite::Row) -> Result<AppointmentRow, rusqlite::Error> {
    Ok(AppointmentRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        date: row.get(3)?,
        location: row.get(4)?,
        notes: row.get(5)?,
        document_ids: row.get(6)?,
    })
}

fn appointment_from_row(row: AppointmentRow) -> Result<Appointment, DatabaseError> {
    Ok(Appointment {
        id: parse_uuid("appointments.id", &row.id)?,
        owner_id: parse_uuid("appointments.owner_id", &row.owner_id)?,
        title: row.title,
        date: parse_db_time("appointments.date", &row.date)?,
        location: row.location,
        notes: row.notes,
        document_ids: from_json("appointments.document_ids", &row.document_ids)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{delete_document, insert_document};
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{ExtractionStatus, SummaryStatus};
    use crate::models::{AppointmentPatch, Document};
    use chrono::{TimeZone, Utc};

    fn stored_document(conn: &Connection, owner: Uuid) -> Uuid {
        let doc = Document {
            id: Uuid::new_v4(),
            owner_id: owner,
            name: "Referral".into(),
            category: String::new(),
            tags: vec![],
            file_ref: "r.txt".into(),
            uploaded_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            extracted_text: None,
            extraction_status: ExtractionStatus::Pending,
            extraction_error: None,
            summary: None,
            summary_status: SummaryStatus::None,
            summary_error: None,
        };
        insert_document(conn, &doc).unwrap();
        doc.id
    }

    fn appointment(owner: Uuid, day: u32, docs: Vec<Uuid>) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            owner_id: owner,
            title: format!("Visit {day}"),
            date: Utc.with_ymd_and_hms(2024, 5, day, 14, 0, 0).unwrap(),
            location: None,
            notes: Some("bring insurance card".into()),
            document_ids: docs,
        }
    }

    #[test]
    fn insert_get_update_delete() {
        let conn = open_memory_database().unwrap();
        let mut appt = appointment(Uuid::new_v4(), 3, vec![Uuid::new_v4()]);
        insert_appointment(&conn, &appt).unwrap();
        assert_eq!(get_appointment(&conn, &appt.id).unwrap().unwrap(), appt);

        appt.location = Some("Room 12".into());
        update_appointment(&conn, &appt).unwrap();
        assert_eq!(
            get_appointment(&conn, &appt.id).unwrap().unwrap().location.as_deref(),
            Some("Room 12")
        );

        assert!(delete_appointment(&conn, &appt.id).unwrap());
        assert!(!delete_appointment(&conn, &appt.id).unwrap());
    }

    #[test]
    fn list_orders_by_date() {
        let conn = open_memory_database().unwrap();
        let owner = Uuid::new_v4();
        let late = appointment(owner, 20, vec![]);
        let early = appointment(owner, 2, vec![]);
        insert_appointment(&conn, &late).unwrap();
        insert_appointment(&conn, &early).unwrap();
        let ids: Vec<Uuid> = list_appointments_by_owner(&conn, &owner)
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![early.id, late.id]);
    }

    #[test]
    fn detach_everywhere_only_touches_references() {
        let conn = open_memory_database().unwrap();
        let owner = Uuid::new_v4();
        let doc = Uuid::new_v4();
        let other = Uuid::new_v4();
        let a = appointment(owner, 1, vec![doc, other]);
        let b = appointment(owner, 2, vec![other]);
        insert_appointment(&conn, &a).unwrap();
        insert_appointment(&conn, &b).unwrap();

        assert_eq!(detach_document_everywhere(&conn, &owner, &doc).unwrap(), 1);
        assert_eq!(
            get_appointment(&conn, &a.id).unwrap().unwrap().document_ids,
            vec![other]
        );
        assert_eq!(
            get_appointment(&conn, &b.id).unwrap().unwrap().document_ids,
            vec![other]
        );
    }

    #[test]
    fn modify_attaches_only_existing_owned_documents() {
        let conn = open_memory_database().unwrap();
        let owner = Uuid::new_v4();
        let mine = stored_document(&conn, owner);
        let theirs = stored_document(&conn, Uuid::new_v4());
        let appt = appointment(owner, 4, vec![]);
        insert_appointment(&conn, &appt).unwrap();

        let updated = modify_appointment(&conn, &appt.id, &AppointmentChange::Attach(mine)).unwrap();
        assert_eq!(updated.document_ids, vec![mine]);
        for stray in [theirs, Uuid::new_v4()] {
            let updated =
                modify_appointment(&conn, &appt.id, &AppointmentChange::Attach(stray)).unwrap();
            assert_eq!(updated.document_ids, vec![mine]);
        }
        assert_eq!(get_appointment(&conn, &appt.id).unwrap().unwrap().document_ids, vec![mine]);
    }

    #[test]
    fn modify_after_document_delete_keeps_reference_gone() {
        let conn = open_memory_database().unwrap();
        let owner = Uuid::new_v4();
        let doc = stored_document(&conn, owner);
        let appt = appointment(owner, 6, vec![doc]);
        insert_appointment(&conn, &appt).unwrap();

        delete_document(&conn, &doc).unwrap();
        let patch = AppointmentPatch {
            title: Some("Renamed".into()),
            ..Default::default()
        };
        let updated = modify_appointment(&conn, &appt.id, &AppointmentChange::Patch(patch)).unwrap();
        assert_eq!(updated.title, "Renamed");
        assert!(updated.document_ids.is_empty());
    }

    #[test]
    fn modify_missing_appointment_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = modify_appointment(&conn, &Uuid::new_v4(), &AppointmentChange::Detach(Uuid::new_v4()))
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }
}
