use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{from_json, parse_db_time, parse_uuid, to_db_time, to_json};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

const DOCUMENT_COLUMNS: &str = "id, owner_id, name, category, tags, file_ref, uploaded_at,
     extracted_text, extraction_status, extraction_error, summary, summary_status, summary_error";

/// SQLite's `trim()` only strips spaces unless told otherwise.
const BLANK_CHARS: &str = "' ' || char(9) || char(10) || char(13)";

pub fn insert_document(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO documents (id, owner_id, name, category, tags, file_ref, uploaded_at,
         extracted_text, extraction_status, extraction_error, summary, summary_status, summary_error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            doc.id.to_string(),
            doc.owner_id.to_string(),
            doc.name,
            doc.category,
            to_json("tags", &doc.tags)?,
            doc.file_ref,
            to_db_time(&doc.uploaded_at),
            doc.extracted_text,
            doc.extraction_status.as_str(),
            doc.extraction_error,
            doc.summary,
            doc.summary_status.as_str(),
            doc.summary_error,
        ],
    )?;
    Ok(())
}

pub fn get_document(conn: &Connection, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
    let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], read_document_row)
        .optional()?;

    row.map(document_from_row).transpose()
}

/// All documents of one owner, newest upload first.
pub fn list_documents_by_owner(
    conn: &Connection,
    owner_id: &Uuid,
) -> Result<Vec<Document>, DatabaseError> {
    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE owner_id = ?1 ORDER BY uploaded_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner_id.to_string()], read_document_row)?;

    let mut docs = Vec::new();
    for row in rows {
        docs.push(document_from_row(row?)?);
    }
    Ok(docs)
}

/// Write every mutable column of `doc`. Immutable columns are never rewritten.
pub fn update_document(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET name = ?2, category = ?3, tags = ?4, extracted_text = ?5,
         extraction_status = ?6, extraction_error = ?7, summary = ?8, summary_status = ?9,
         summary_error = ?10
         WHERE id = ?1",
        params![
            doc.id.to_string(),
            doc.name,
            doc.category,
            to_json("tags", &doc.tags)?,
            doc.extracted_text,
            doc.extraction_status.as_str(),
            doc.extraction_error,
            doc.summary,
            doc.summary_status.as_str(),
            doc.summary_error,
        ],
    )?;
    if rows == 0 {
        return Err(DatabaseError::not_found("Document", doc.id));
    }
    Ok(())
}

/// Read-modify-write of a partial update inside one transaction.
pub fn patch_document(
    conn: &Connection,
    id: &Uuid,
    patch: &DocumentPatch,
) -> Result<Document, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let mut doc = get_document(&tx, id)?.ok_or_else(|| DatabaseError::not_found("Document", id))?;
    if !patch.is_empty() {
        patch.apply(&mut doc);
        update_document(&tx, &doc)?;
    }
    tx.commit()?;
    Ok(doc)
}

/// Move the extraction track to `processing` unless it is already there
/// or a summary is being generated from the current text.
///
/// Returns `false` when the claim was refused. The conditional UPDATE is
/// the only writer that enters `processing`, so two callers cannot both win.
pub fn claim_extraction(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET extraction_status = 'processing', extraction_error = NULL
         WHERE id = ?1 AND extraction_status != 'processing' AND summary_status != 'processing'",
        params![id.to_string()],
    )?;
    Ok(rows == 1)
}

/// Move the summary track to `processing` if extraction is complete with
/// non-blank text and no summary is already in flight.
pub fn claim_summary(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let sql = format!(
        "UPDATE documents SET summary_status = 'processing', summary_error = NULL
         WHERE id = ?1
           AND summary_status != 'processing'
           AND extraction_status = 'completed'
           AND extracted_text IS NOT NULL
           AND trim(extracted_text, {BLANK_CHARS}) != ''"
    );
    let rows = conn.execute(&sql, params![id.to_string()])?;
    Ok(rows == 1)
}

pub const INTERRUPTED: &str = "interrupted before completion";

/// Fail every stage still marked `processing`.
///
/// Claims only live as long as the process that took them, so on open any
/// such row was orphaned by a previous run and would otherwise refuse
/// every later claim.
pub fn fail_interrupted_stages(conn: &Connection) -> Result<usize, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let extraction = tx.execute(
        "UPDATE documents SET extraction_status = 'error', extraction_error = ?1
         WHERE extraction_status = 'processing'",
        params![INTERRUPTED],
    )?;
    let summary = tx.execute(
        "UPDATE documents SET summary_status = 'error', summary_error = ?1
         WHERE summary_status = 'processing'",
        params![INTERRUPTED],
    )?;
    tx.commit()?;
    Ok(extraction + summary)
}

/// Delete a document, its share links, and every appointment reference to it.
///
/// Share links cascade through the foreign key; appointment references live in
/// a JSON column and are rewritten here. Returns the deleted document.
pub fn delete_document(conn: &Connection, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let Some(doc) = get_document(&tx, id)? else {
        return Ok(None);
    };

    let detached = super::detach_document_everywhere(&tx, &doc.owner_id, id)?;
    let links = tx.execute(
        "DELETE FROM share_links WHERE document_id = ?1",
        params![id.to_string()],
    )?;
    tx.execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])?;
    tx.commit()?;

    tracing::info!(
        document_id = %id,
        share_links = links,
        appointments = detached,
        "Document deleted with dependent references"
    );
    Ok(Some(doc))
}

// Internal row type for Document mapping
struct DocumentRow {
    id: String,
    owner_id: String,
    name: String,
    category: String,
    tags: String,
    file_ref: String,
    uploaded_at: String,
    extracted_text: Option<String>,
    extraction_status: String,
    extraction_error: Option<String>,
    summary: Option<String>,
    summary_status: String,
    summary_error: Option<String>,
}

fn read_document_row(row: &rusqlite::Row) -> Result<DocumentRow, rusqlite::Error> {
    Ok(DocumentRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        category: row.get(3)?,
        tags: row.get(4)?,
        file_ref: row.get(5)?,
        uploaded_at: row.get(6)?,
        extracted_text: row.get(7)?,
        extraction_status: row.get(8)?,
        extraction_error: row.get(9)?,
        summary: row.get(10)?,
        summary_status: row.get(11)?,
        summary_error: row.get(12)?,
    })
}

fn document_from_row(row: DocumentRow) -> Result<Document, DatabaseError> {
    Ok(Document {
        id: parse_uuid("documents.id", &row.id)?,
        owner_id: parse_uuid("documents.owner_id", &row.owner_id)?,
        name: row.name,
        category: row.category,
        tags: from_json("documents.tags", &row.tags)?,
        file_ref: row.file_ref,
        uploaded_at: parse_db_time("documents.uploaded_at", &row.uploaded_at)?,
        extracted_text: row.extracted_text,
        extraction_status: ExtractionStatus::from_str(&row.extraction_status)?,
        extraction_error: row.extraction_error,
        summary: row.summary,
        summary_status: SummaryStatus::from_str(&row.summary_status)?,
        summary_error: row.summary_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use chrono::{TimeZone, Utc};

    fn make_document(conn: &Connection, owner: Uuid) -> Document {
        let doc = Document {
            id: Uuid::new_v4(),
            owner_id: owner,
            name: "Discharge letter".into(),
            category: "hospital".into(),
            tags: vec!["cardio".into(), "2024".into()],
            file_ref: "/uploads/letter.png".into(),
            uploaded_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            extracted_text: None,
            extraction_status: ExtractionStatus::Pending,
            extraction_error: None,
            summary: None,
            summary_status: SummaryStatus::None,
            summary_error: None,
        };
        insert_document(conn, &doc).unwrap();
        doc
    }

    #[test]
    fn document_insert_and_retrieve() {
        let conn = open_memory_database().unwrap();
        let doc = make_document(&conn, Uuid::new_v4());
        let loaded = get_document(&conn, &doc.id).unwrap().unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn missing_document_is_none() {
        let conn = open_memory_database().unwrap();
        assert!(get_document(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn list_is_owner_scoped_and_newest_first() {
        let conn = open_memory_database().unwrap();
        let owner = Uuid::new_v4();
        let older = make_document(&conn, owner);
        let mut newer = older.clone();
        newer.id = Uuid::new_v4();
        newer.uploaded_at = older.uploaded_at + chrono::Duration::days(1);
        insert_document(&conn, &newer).unwrap();
        make_document(&conn, Uuid::new_v4());

        let docs = list_documents_by_owner(&conn, &owner).unwrap();
        let ids: Vec<Uuid> = docs.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[test]
    fn patch_leaves_unspecified_fields() {
        let conn = open_memory_database().unwrap();
        let doc = make_document(&conn, Uuid::new_v4());
        let patch = DocumentPatch {
            category: Some("cardiology".into()),
            ..Default::default()
        };
        let updated = patch_document(&conn, &doc.id, &patch).unwrap();
        assert_eq!(updated.category, "cardiology");
        assert_eq!(updated.name, doc.name);
        assert_eq!(updated.tags, doc.tags);
        assert_eq!(get_document(&conn, &doc.id).unwrap().unwrap(), updated);
    }

    #[test]
    fn patch_missing_document_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = patch_document(&conn, &Uuid::new_v4(), &DocumentPatch::default()).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn extraction_claim_is_exclusive() {
        let conn = open_memory_database().unwrap();
        let doc = make_document(&conn, Uuid::new_v4());
        assert!(claim_extraction(&conn, &doc.id).unwrap());
        assert!(!claim_extraction(&conn, &doc.id).unwrap());
        let loaded = get_document(&conn, &doc.id).unwrap().unwrap();
        assert_eq!(loaded.extraction_status, ExtractionStatus::Processing);
    }

    #[test]
    fn extraction_claim_clears_previous_error() {
        let conn = open_memory_database().unwrap();
        let doc = make_document(&conn, Uuid::new_v4());
        patch_document(&conn, &doc.id, &DocumentPatch::extraction_failed("boom")).unwrap();
        assert!(claim_extraction(&conn, &doc.id).unwrap());
        let loaded = get_document(&conn, &doc.id).unwrap().unwrap();
        assert_eq!(loaded.extraction_error, None);
    }

    #[test]
    fn summary_claim_requires_usable_text() {
        let conn = open_memory_database().unwrap();
        let doc = make_document(&conn, Uuid::new_v4());
        assert!(!claim_summary(&conn, &doc.id).unwrap());

        patch_document(
            &conn,
            &doc.id,
            &DocumentPatch::extraction_succeeded(" \n\t ".into()),
        )
        .unwrap();
        assert!(!claim_summary(&conn, &doc.id).unwrap());

        patch_document(
            &conn,
            &doc.id,
            &DocumentPatch::extraction_succeeded("Patient: Jane Doe".into()),
        )
        .unwrap();
        assert!(claim_summary(&conn, &doc.id).unwrap());
        assert!(!claim_summary(&conn, &doc.id).unwrap());
    }

    #[test]
    fn extraction_claim_refused_while_summarizing() {
        let conn = open_memory_database().unwrap();
        let doc = make_document(&conn, Uuid::new_v4());
        patch_document(&conn, &doc.id, &DocumentPatch::extraction_succeeded("text".into())).unwrap();
        assert!(claim_summary(&conn, &doc.id).unwrap());
        assert!(!claim_extraction(&conn, &doc.id).unwrap());
    }

    #[test]
    fn interrupted_stages_become_errors() {
        let conn = open_memory_database().unwrap();
        let extracting = make_document(&conn, Uuid::new_v4());
        let summarizing = make_document(&conn, Uuid::new_v4());
        let idle = make_document(&conn, Uuid::new_v4());
        assert!(claim_extraction(&conn, &extracting.id).unwrap());
        patch_document(&conn, &summarizing.id, &DocumentPatch::extraction_succeeded("text".into())).unwrap();
        assert!(claim_summary(&conn, &summarizing.id).unwrap());

        assert_eq!(fail_interrupted_stages(&conn).unwrap(), 2);

        let loaded = get_document(&conn, &extracting.id).unwrap().unwrap();
        assert_eq!(loaded.extraction_status, ExtractionStatus::Error);
        assert_eq!(loaded.extraction_error.as_deref(), Some(INTERRUPTED));
        let loaded = get_document(&conn, &summarizing.id).unwrap().unwrap();
        assert_eq!(loaded.extraction_status, ExtractionStatus::Completed);
        assert_eq!(loaded.summary_status, SummaryStatus::Error);
        assert_eq!(loaded.summary_error.as_deref(), Some(INTERRUPTED));
        assert_eq!(get_document(&conn, &idle.id).unwrap().unwrap(), idle);

        assert!(claim_extraction(&conn, &extracting.id).unwrap());
    }

    #[test]
    fn delete_returns_document_once() {
        let conn = open_memory_database().unwrap();
        let doc = make_document(&conn, Uuid::new_v4());
        assert_eq!(delete_document(&conn, &doc.id).unwrap(), Some(doc.clone()));
        assert_eq!(delete_document(&conn, &doc.id).unwrap(), None);
    }
}
