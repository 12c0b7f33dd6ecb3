//! Aggregate statistics queries over senders and messages.

use rusqlite::params;
use serde::Serialize;

use super::{Database, DatabaseError};

/// Number of senders returned by the metrics endpoint.
pub const TOP_SENDERS: u32 = 10;

/// One entry of the top-senders ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopSender {
    pub email: String,
    pub unread: i64,
}

/// Inbox-wide aggregate summary.
#[derive(Debug, Clone, Serialize)]
pub struct InboxSummary {
    pub total_senders: u64,
    pub total_messages: u64,
    pub top_senders: Vec<TopSender>,
}

/// Counts distinct senders.
pub fn sender_count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM senders", [], |r| r.get(0))?;
        Ok(count)
    })
}

/// Counts stored messages.
pub fn message_count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?;
        Ok(count)
    })
}

/// Returns the `limit` senders with the most unread messages.
///
/// Ties on `unread_count` are ordered by identity key ascending so the
/// ranking is stable across calls.
pub fn top_senders_by_unread(db: &Database, limit: u32) -> Result<Vec<TopSender>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT email, unread_count FROM senders
             ORDER BY unread_count DESC, email ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(TopSender {
                    email: row.get(0)?,
                    unread: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Returns the summary served by the metrics endpoint.
pub fn summary(db: &Database) -> Result<InboxSummary, DatabaseError> {
    Ok(InboxSummary {
        total_senders: sender_count(db)?,
        total_messages: message_count(db)?,
        top_senders: top_senders_by_unread(db, TOP_SENDERS)?,
    })
}
