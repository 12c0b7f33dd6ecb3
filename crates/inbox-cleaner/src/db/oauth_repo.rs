//! OAuth token repository: CRUD operations for the `oauth_tokens` table.

use rusqlite::{params, OptionalExtension};

use super::{Database, DatabaseError};

/// A stored OAuth token for one mailbox owner.
#[derive(Clone)]
pub struct OAuthTokenRow {
    pub owner_email: String,
    pub provider: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: String,
    pub created_at: String,
    pub updated_at: String,
}

impl std::fmt::Debug for OAuthTokenRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokenRow")
            .field("owner_email", &self.owner_email)
            .field("provider", &self.provider)
            .field("access_token", &"[REDACTED]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl OAuthTokenRow {
    /// Checks if the token is expired (or expires within `buffer_seconds`).
    pub fn is_expired(&self, buffer_seconds: u64) -> bool {
        let Ok(expires) = chrono::DateTime::parse_from_rfc3339(&self.expires_at) else {
            return true; // Treat unparseable expiry as expired.
        };
        let now = chrono::Utc::now();
        let buffer = chrono::Duration::seconds(buffer_seconds.min(365 * 24 * 3600) as i64);
        expires <= now + buffer
    }

    /// Checks if the token can be refreshed.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// Inserts or updates an OAuth token.
pub fn upsert(db: &Database, row: &OAuthTokenRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO oauth_tokens (owner_email, provider, access_token, refresh_token, expires_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(owner_email) DO UPDATE SET
               provider = ?2,
               access_token = ?3,
               refresh_token = COALESCE(?4, refresh_token),
               expires_at = ?5,
               updated_at = ?7",
            params![
                row.owner_email,
                row.provider,
                row.access_token,
                row.refresh_token,
                row.expires_at,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds the token stored for an owner.
pub fn find(db: &Database, owner_email: &str) -> Result<Option<OAuthTokenRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT owner_email, provider, access_token, refresh_token, expires_at, created_at, updated_at
                 FROM oauth_tokens WHERE owner_email = ?1",
                params![owner_email],
                |row| {
                    Ok(OAuthTokenRow {
                        owner_email: row.get(0)?,
                        provider: row.get(1)?,
                        access_token: row.get(2)?,
                        refresh_token: row.get(3)?,
                        expires_at: row.get(4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    })
}

/// Deletes the token stored for an owner.
pub fn delete(db: &Database, owner_email: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "DELETE FROM oauth_tokens WHERE owner_email = ?1",
            params![owner_email],
        )?;
        Ok(())
    })
}
