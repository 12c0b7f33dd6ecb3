//! Audit repository: append-only event log in the `audits` table.

use rusqlite::params;
use serde::Serialize;

use super::{Database, DatabaseError};

/// Longest event name the `audits` table accepts.
pub const MAX_EVENT_LEN: usize = 100;

/// A stored audit event.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRow {
    pub id: i64,
    pub event: String,
    pub payload: serde_json::Value,
    pub created_at: String,
}

/// Appends an audit event and returns its id.
pub fn insert(
    db: &Database,
    event: &str,
    payload: &serde_json::Value,
) -> Result<i64, DatabaseError> {
    if event.is_empty() || event.len() > MAX_EVENT_LEN {
        return Err(DatabaseError::InvalidRow {
            entity: "audit",
            reason: format!("event name must be 1..={} bytes", MAX_EVENT_LEN),
        });
    }
    let payload = serde_json::to_string(payload)?;

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO audits (event, payload, created_at) VALUES (?1, ?2, ?3)",
            params![event, payload, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Returns the most recent events, newest first.
pub fn recent(db: &Database, limit: u32) -> Result<Vec<AuditRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, event, payload, created_at FROM audits ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, event, payload, created_at)| -> Result<AuditRow, DatabaseError> {
                Ok(AuditRow {
                    id,
                    event,
                    payload: serde_json::from_str(&payload)?,
                    created_at,
                })
            })
            .collect()
    })
}
