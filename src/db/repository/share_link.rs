use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{parse_db_time, parse_uuid, to_db_time};
use crate::db::DatabaseError;
use crate::models::ShareLink;

const SHARE_LINK_COLUMNS: &str =
    "id, document_id, token, created_at, expires_at, max_accesses, access_count";

pub fn insert_share_link(conn: &Connection, link: &ShareLink) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO share_links (id, document_id, token, created_at, expires_at, max_accesses, access_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            link.id.to_string(),
            link.document_id.to_string(),
            link.token,
            to_db_time(&link.created_at),
            link.expires_at.as_ref().map(to_db_time),
            link.max_accesses,
            link.access_count,
        ],
    )?;
    Ok(())
}

pub fn get_share_link(conn: &Connection, id: &Uuid) -> Result<Option<ShareLink>, DatabaseError> {
    let sql = format!("SELECT {SHARE_LINK_COLUMNS} FROM share_links WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], read_share_link_row)
        .optional()?;
    row.map(share_link_from_row).transpose()
}

pub fn get_share_link_by_token(
    conn: &Connection,
    token: &str,
) -> Result<Option<ShareLink>, DatabaseError> {
    let sql = format!("SELECT {SHARE_LINK_COLUMNS} FROM share_links WHERE token = ?1");
    let row = conn
        .query_row(&sql, params![token], read_share_link_row)
        .optional()?;
    row.map(share_link_from_row).transpose()
}

/// Links for one document, newest first.
pub fn list_share_links_for_document(
    conn: &Connection,
    document_id: &Uuid,
) -> Result<Vec<ShareLink>, DatabaseError> {
    let sql = format!(
        "SELECT {SHARE_LINK_COLUMNS} FROM share_links WHERE document_id = ?1 ORDER BY created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![document_id.to_string()], read_share_link_row)?;

    let mut links = Vec::new();
    for row in rows {
        links.push(share_link_from_row(row?)?);
    }
    Ok(links)
}

/// Check validity and count one access in a single statement.
///
/// Returns the link with its incremented count, or `None` if the token is
/// unknown, expired at `now`, or out of accesses.
pub fn consume_share_link(
    conn: &Connection,
    token: &str,
    now: &DateTime<Utc>,
) -> Result<Option<ShareLink>, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let rows = tx.execute(
        "UPDATE share_links SET access_count = access_count + 1
         WHERE token = ?1
           AND (expires_at IS NULL OR expires_at > ?2)
           AND (max_accesses IS NULL OR access_count < max_accesses)",
        params![token, to_db_time(now)],
    )?;
    let link = if rows == 1 {
        get_share_link_by_token(&tx, token)?
    } else {
        None
    };
    tx.commit()?;
    Ok(link)
}

pub fn delete_share_link(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let rows = conn.execute("DELETE FROM share_links WHERE id = ?1", params![id.to_string()])?;
    Ok(rows > 0)
}

/// Delete links that can never resolve again. Returns the number removed.
pub fn purge_inactive_share_links(
    conn: &Connection,
    now: &DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let rows = conn.execute(
        "DELETE FROM share_links
         WHERE (expires_at IS NOT NULL AND expires_at <= ?1)
            OR (max_accesses IS NOT NULL AND access_count >= max_accesses)",
        params![to_db_time(now)],
    )?;
    Ok(rows)
}

struct ShareLinkRow {
    id: String,
    document_id: String,
    token: String,
    created_at: String,
    expires_at: Option<String>,
    max_accesses: Option<u32>,
    access_count: u32,
}

fn read_share_link_row(row: &rusqlite::Row) -> Result<ShareLinkRow, rusqlite::Error> {
    Ok(ShareLinkRow {
        id: row.get(0)?,
        document_id: row.get(1)?,
        token: row.get(2)?,
        created_at: row.get(3)?,
        expires_at: row.get(4)?,
        max_accesses: row.get(5)?,
        access_count: row.get(6)?,
    })
}

fn share_link_from_row(row: ShareLinkRow) -> Result<ShareLink, DatabaseError> {
    Ok(ShareLink {
        id: parse_uuid("share_links.id", &row.id)?,
        document_id: parse_uuid("share_links.document_id", &row.document_id)?,
        token: row.token,
        created_at: parse_db_time("share_links.created_at", &row.created_at)?,
        expires_at: row
            .expires_at
            .as_deref()
            .map(|raw| parse_db_time("share_links.expires_at", raw))
            .transpose()?,
        max_accesses: row.max_accesses,
        access_count: row.access_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::insert_document;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{ExtractionStatus, SummaryStatus};
    use crate::models::Document;
    use chrono::Duration;

    fn seed_document(conn: &Connection) -> Uuid {
        let id = Uuid::new_v4();
        insert_document(
            conn,
            &Document {
                id,
                owner_id: Uuid::new_v4(),
                name: "Scan".into(),
                category: String::new(),
                tags: vec![],
                file_ref: "/uploads/scan.jpg".into(),
                uploaded_at: Utc::now(),
                extracted_text: None,
                extraction_status: ExtractionStatus::Pending,
                extraction_error: None,
                summary: None,
                summary_status: SummaryStatus::None,
                summary_error: None,
            },
        )
        .unwrap();
        id
    }

    fn link(document_id: Uuid, token: &str, expires_at: Option<DateTime<Utc>>, max: Option<u32>) -> ShareLink {
        ShareLink {
            id: Uuid::new_v4(),
            document_id,
            token: token.into(),
            created_at: Utc::now(),
            expires_at,
            max_accesses: max,
            access_count: 0,
        }
    }

    #[test]
    fn consume_counts_up_to_ceiling() {
        let conn = open_memory_database().unwrap();
        let doc = seed_document(&conn);
        insert_share_link(&conn, &link(doc, "tok", None, Some(2))).unwrap();
        let now = Utc::now();

        assert_eq!(consume_share_link(&conn, "tok", &now).unwrap().unwrap().access_count, 1);
        assert_eq!(consume_share_link(&conn, "tok", &now).unwrap().unwrap().access_count, 2);
        assert!(consume_share_link(&conn, "tok", &now).unwrap().is_none());
    }

    #[test]
    fn consume_refuses_expired_and_unknown() {
        let conn = open_memory_database().unwrap();
        let doc = seed_document(&conn);
        let now = Utc::now();
        insert_share_link(&conn, &link(doc, "old", Some(now - Duration::minutes(1)), None)).unwrap();
        assert!(consume_share_link(&conn, "old", &now).unwrap().is_none());
        assert!(consume_share_link(&conn, "missing", &now).unwrap().is_none());
        let stored = get_share_link_by_token(&conn, "old").unwrap().unwrap();
        assert_eq!(stored.access_count, 0);
    }

    #[test]
    fn links_cascade_with_document() {
        let conn = open_memory_database().unwrap();
        let doc = seed_document(&conn);
        insert_share_link(&conn, &link(doc, "a", None, None)).unwrap();
        conn.execute("DELETE FROM documents WHERE id = ?1", params![doc.to_string()])
            .unwrap();
        assert!(list_share_links_for_document(&conn, &doc).unwrap().is_empty());
    }

    #[test]
    fn purge_removes_only_dead_links() {
        let conn = open_memory_database().unwrap();
        let doc = seed_document(&conn);
        let now = Utc::now();
        insert_share_link(&conn, &link(doc, "live", Some(now + Duration::days(1)), Some(5))).unwrap();
        insert_share_link(&conn, &link(doc, "expired", Some(now - Duration::days(1)), None)).unwrap();
        let mut spent = link(doc, "spent", None, Some(1));
        spent.access_count = 1;
        insert_share_link(&conn, &spent).unwrap();

        assert_eq!(purge_inactive_share_links(&conn, &now).unwrap(), 2);
        let remaining = list_share_links_for_document(&conn, &doc).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].token, "live");
    }
}
