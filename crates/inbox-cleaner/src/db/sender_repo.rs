//! Sender repository: per-sender aggregate rows in the `senders` table.
//!
//! Write functions take a bare `&Connection` so they can run inside the
//! page transaction opened by [`Database::with_transaction`]; read
//! functions take the shared [`Database`] handle.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A sender aggregate row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderRow {
    pub email: String,
    pub unread_count: i64,
    pub read_count: i64,
    pub has_list_unsubscribe: bool,
    pub unsubscribe_mailto: Option<String>,
    pub unsubscribe_http: Option<String>,
    pub unsubscribe_one_click: bool,
    pub first_seen_at: String,
    pub last_seen_at: String,
}

impl SenderRow {
    /// Builds a fresh sender with zero counters and no unsubscribe signal.
    ///
    /// The key must already be normalized (trimmed, lower-case). An empty
    /// key is accepted and stands for "unknown sender".
    pub fn new(email: &str, seen_at: &str) -> Result<Self, DatabaseError> {
        validate_key(email)?;
        validate_timestamp("sender", seen_at)?;

        Ok(Self {
            email: email.to_string(),
            unread_count: 0,
            read_count: 0,
            has_list_unsubscribe: false,
            unsubscribe_mailto: None,
            unsubscribe_http: None,
            unsubscribe_one_click: false,
            first_seen_at: seen_at.to_string(),
            last_seen_at: seen_at.to_string(),
        })
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            email: row.get(0)?,
            unread_count: row.get(1)?,
            read_count: row.get(2)?,
            has_list_unsubscribe: row.get(3)?,
            unsubscribe_mailto: row.get(4)?,
            unsubscribe_http: row.get(5)?,
            unsubscribe_one_click: row.get(6)?,
            first_seen_at: row.get(7)?,
            last_seen_at: row.get(8)?,
        })
    }
}

/// One observation of a sender while folding a page of messages.
#[derive(Debug, Clone, Copy)]
pub struct SenderEncounter<'a> {
    pub email: &'a str,
    /// How much to add to `unread_count` (0 when a duplicate is not counted).
    pub unread_increment: i64,
    pub has_list_unsubscribe: bool,
    pub unsubscribe_mailto: Option<&'a str>,
    pub unsubscribe_http: Option<&'a str>,
    pub unsubscribe_one_click: bool,
    pub seen_at: &'a str,
}

const SELECT_COLUMNS: &str = "SELECT email, unread_count, read_count, has_list_unsubscribe,
     unsubscribe_mailto, unsubscribe_http, unsubscribe_one_click, first_seen_at, last_seen_at
     FROM senders";

/// Inserts a new sender row.
pub fn insert(conn: &Connection, row: &SenderRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO senders (email, unread_count, read_count, has_list_unsubscribe,
         unsubscribe_mailto, unsubscribe_http, unsubscribe_one_click, first_seen_at, last_seen_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            row.email,
            row.unread_count,
            row.read_count,
            row.has_list_unsubscribe,
            row.unsubscribe_mailto,
            row.unsubscribe_http,
            row.unsubscribe_one_click,
            row.first_seen_at,
            row.last_seen_at,
        ],
    )?;
    Ok(())
}

/// Checks whether a sender row exists.
pub fn exists(conn: &Connection, email: &str) -> Result<bool, DatabaseError> {
    let found: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM senders WHERE email = ?1)",
        params![email],
        |r| r.get(0),
    )?;
    Ok(found)
}

/// Folds one encounter into the sender's row, creating it first if needed.
///
/// Returns `true` when the row was created by this call. Unsubscribe
/// targets are overwritten only when the encounter carries a signal and the
/// target is present; an absent target keeps its previous value.
pub fn record_encounter(
    conn: &Connection,
    encounter: &SenderEncounter<'_>,
) -> Result<bool, DatabaseError> {
    let created = if exists(conn, encounter.email)? {
        false
    } else {
        insert(conn, &SenderRow::new(encounter.email, encounter.seen_at)?)?;
        true
    };

    conn.execute(
        "UPDATE senders SET unread_count = unread_count + ?2, last_seen_at = ?3 WHERE email = ?1",
        params![encounter.email, encounter.unread_increment, encounter.seen_at],
    )?;

    if encounter.has_list_unsubscribe {
        conn.execute(
            "UPDATE senders SET
               has_list_unsubscribe = 1,
               unsubscribe_mailto = COALESCE(?2, unsubscribe_mailto),
               unsubscribe_http = COALESCE(?3, unsubscribe_http),
               unsubscribe_one_click = ?4
             WHERE email = ?1",
            params![
                encounter.email,
                encounter.unsubscribe_mailto,
                encounter.unsubscribe_http,
                encounter.unsubscribe_one_click,
            ],
        )?;
    }

    Ok(created)
}

/// Finds a sender by identity key.
pub fn find(db: &Database, email: &str) -> Result<Option<SenderRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                &format!("{} WHERE email = ?1", SELECT_COLUMNS),
                params![email],
                SenderRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Lists every sender ordered by identity key.
pub fn list_all(db: &Database) -> Result<Vec<SenderRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!("{} ORDER BY email", SELECT_COLUMNS))?;
        let rows = stmt
            .query_map([], SenderRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

fn validate_key(email: &str) -> Result<(), DatabaseError> {
    if email.trim() != email {
        return Err(DatabaseError::InvalidRow {
            entity: "sender",
            reason: format!("identity key '{}' has surrounding whitespace", email),
        });
    }
    // Same fold as the normalizer; some uppercase letters have no lower-case form.
    if email.to_lowercase() != email {
        return Err(DatabaseError::InvalidRow {
            entity: "sender",
            reason: format!("identity key '{}' is not lower-case", email),
        });
    }
    Ok(())
}

pub(crate) fn validate_timestamp(entity: &'static str, value: &str) -> Result<(), DatabaseError> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|_| ())
        .map_err(|e| DatabaseError::InvalidRow {
            entity,
            reason: format!("timestamp '{}' is not RFC 3339: {}", value, e),
        })
}
