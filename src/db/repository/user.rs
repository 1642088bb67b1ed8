use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{parse_db_time, parse_uuid, to_db_time};
use crate::db::DatabaseError;
use crate::models::User;

const USER_COLUMNS: &str =
    "id, username, password_hash, totp_secret, totp_enabled, totp_verified, created_at";

/// Insert a user. A duplicate username surfaces as `ConstraintViolation`.
pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    let result = conn.execute(
        "INSERT INTO users (id, username, password_hash, totp_secret, totp_enabled, totp_verified, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.id.to_string(),
            user.username,
            user.password_hash,
            user.totp_secret,
            user.totp_enabled as i32,
            user.totp_verified as i32,
            to_db_time(&user.created_at),
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(DatabaseError::ConstraintViolation(format!(
                "username '{}' already exists",
                user.username
            )))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], read_user_row)
        .optional()?;
    row.map(user_from_row).transpose()
}

pub fn get_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1");
    let row = conn
        .query_row(&sql, params![username], read_user_row)
        .optional()?;
    row.map(user_from_row).transpose()
}

struct UserRow {
    id: String,
    username: String,
    password_hash: String,
    totp_secret: Option<String>,
    totp_enabled: i32,
    totp_verified: i32,
    created_at: String,
}

fn read_user_row(row: &rusqlite::Row) -> Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        totp_secret: row.get(3)?,
        totp_enabled: row.get(4)?,
        totp_verified: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn user_from_row(row: UserRow) -> Result<User, DatabaseError> {
    Ok(User {
        id: parse_uuid("users.id", &row.id)?,
        username: row.username,
        password_hash: row.password_hash,
        totp_secret: row.totp_secret,
        totp_enabled: row.totp_enabled != 0,
        totp_verified: row.totp_verified != 0,
        created_at: parse_db_time("users.created_at", &row.created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use chrono::Utc;

    fn user(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: name.into(),
            password_hash: "pbkdf2-sha256$1000$c2FsdA$aGFzaA".into(),
            totp_secret: None,
            totp_enabled: false,
            totp_verified: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insert_and_lookup_by_username() {
        let conn = open_memory_database().unwrap();
        let u = user("maria");
        insert_user(&conn, &u).unwrap();
        let found = get_user_by_username(&conn, "maria").unwrap().unwrap();
        assert_eq!(found.id, u.id);
        assert!(get_user(&conn, &u.id).unwrap().is_some());
        assert!(get_user_by_username(&conn, "nobody").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_constraint_violation() {
        let conn = open_memory_database().unwrap();
        insert_user(&conn, &user("maria")).unwrap();
        let err = insert_user(&conn, &user("maria")).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }
}
