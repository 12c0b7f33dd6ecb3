//! Message repository: one row per ingested provider message id.

use rusqlite::{params, Connection, OptionalExtension};

use super::sender_repo::validate_timestamp;
use super::{Database, DatabaseError};

/// A stored message row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub gmail_id: String,
    pub thread_id: String,
    pub sender_email: String,
    pub is_read: bool,
    pub ingested_at: String,
}

impl MessageRow {
    /// Builds an unread message row. The provider id must be non-empty.
    pub fn new(
        gmail_id: &str,
        thread_id: &str,
        sender_email: &str,
        ingested_at: &str,
    ) -> Result<Self, DatabaseError> {
        if gmail_id.trim().is_empty() {
            return Err(DatabaseError::InvalidRow {
                entity: "message",
                reason: "message id is empty".to_string(),
            });
        }
        validate_timestamp("message", ingested_at)?;

        Ok(Self {
            gmail_id: gmail_id.to_string(),
            thread_id: thread_id.to_string(),
            sender_email: sender_email.to_string(),
            is_read: false,
            ingested_at: ingested_at.to_string(),
        })
    }
}

/// Inserts a message unless its id is already stored.
///
/// Returns `true` when a row was written. An existing row is never updated.
pub fn insert_if_absent(conn: &Connection, row: &MessageRow) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO messages (gmail_id, thread_id, sender_email, is_read, ingested_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            row.gmail_id,
            row.thread_id,
            row.sender_email,
            row.is_read,
            row.ingested_at,
        ],
    )?;
    Ok(changed == 1)
}

/// Checks whether a message id is already stored.
pub fn exists(conn: &Connection, gmail_id: &str) -> Result<bool, DatabaseError> {
    let found: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM messages WHERE gmail_id = ?1)",
        params![gmail_id],
        |r| r.get(0),
    )?;
    Ok(found)
}

/// Finds a message by provider id.
pub fn find(db: &Database, gmail_id: &str) -> Result<Option<MessageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT gmail_id, thread_id, sender_email, is_read, ingested_at
                 FROM messages WHERE gmail_id = ?1",
                params![gmail_id],
                |row| {
                    Ok(MessageRow {
                        gmail_id: row.get(0)?,
                        thread_id: row.get(1)?,
                        sender_email: row.get(2)?,
                        is_read: row.get(3)?,
                        ingested_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    })
}

/// Counts messages stored for a sender.
pub fn count_by_sender(db: &Database, sender_email: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE sender_email = ?1",
            params![sender_email],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sender_repo::{self, SenderRow};

    const T0: &str = "2026-01-01T00:00:00+00:00";

    fn test_db_with_sender(email: &str) -> Database {
        let db = Database::open_in_memory().expect("Failed to create test database");
        db.with_conn(|conn| sender_repo::insert(conn, &SenderRow::new(email, T0)?))
            .unwrap();
        db
    }

    #[test]
    fn test_new_requires_id() {
        assert!(MessageRow::new("", "t1", "a@b.com", T0).is_err());
        assert!(MessageRow::new("   ", "t1", "a@b.com", T0).is_err());
        let row = MessageRow::new("m1", "t1", "a@b.com", T0).unwrap();
        assert!(!row.is_read);
    }

    #[test]
    fn test_insert_if_absent_is_idempotent() {
        let db = test_db_with_sender("a@b.com");
        let row = MessageRow::new("m1", "t1", "a@b.com", T0).unwrap();

        assert!(db.with_conn(|conn| insert_if_absent(conn, &row)).unwrap());
        assert!(!db.with_conn(|conn| insert_if_absent(conn, &row)).unwrap());
        assert_eq!(count_by_sender(&db, "a@b.com").unwrap(), 1);
    }

    #[test]
    fn test_existing_row_is_not_updated() {
        let db = test_db_with_sender("a@b.com");
        let row = MessageRow::new("m1", "t1", "a@b.com", T0).unwrap();
        db.with_conn(|conn| insert_if_absent(conn, &row)).unwrap();

        let mut replay = row.clone();
        replay.thread_id = "t2".to_string();
        db.with_conn(|conn| insert_if_absent(conn, &replay)).unwrap();

        let stored = find(&db, "m1").unwrap().unwrap();
        assert_eq!(stored.thread_id, "t1");
    }

    #[test]
    fn test_exists() {
        let db = test_db_with_sender("a@b.com");
        assert!(!db.with_conn(|conn| exists(conn, "m1")).unwrap());
        let row = MessageRow::new("m1", "t1", "a@b.com", T0).unwrap();
        db.with_conn(|conn| insert_if_absent(conn, &row)).unwrap();
        assert!(db.with_conn(|conn| exists(conn, "m1")).unwrap());
    }

    #[test]
    fn test_unknown_sender_reference_fails() {
        let db = test_db_with_sender("a@b.com");
        let row = MessageRow::new("m1", "t1", "nobody@b.com", T0).unwrap();
        assert!(db.with_conn(|conn| insert_if_absent(conn, &row)).is_err());
    }
}
