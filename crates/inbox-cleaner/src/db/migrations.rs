//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order. ALTER TABLE ADD COLUMN migrations are handled
//! conditionally so a database created by an older build upgrades cleanly.

use rusqlite::Connection;

use super::error::DatabaseError;

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    kind: MigrationKind,
}

enum MigrationKind {
    /// Execute the SQL directly.
    Standard,
    /// ALTER TABLE ADD COLUMN, skipped if the column already exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
    },
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_senders_table",
        sql: include_str!("sql/001_create_senders.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 2,
        description: "create_messages_table",
        sql: include_str!("sql/002_create_messages.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 3,
        description: "create_oauth_tokens_table",
        sql: include_str!("sql/003_create_oauth_tokens.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 4,
        description: "create_audits_table",
        sql: include_str!("sql/004_create_audits.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 5,
        description: "add_unsubscribe_one_click_to_senders",
        sql: include_str!("sql/005_add_unsubscribe_one_click.sql"),
        kind: MigrationKind::AddColumn {
            table: "senders",
            column: "unsubscribe_one_click",
        },
    },
    Migration {
        version: 6,
        description: "create_action_plans_table",
        sql: include_str!("sql/006_create_action_plans.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 7,
        description: "create_undo_windows_table",
        sql: include_str!("sql/007_create_undo_windows.sql"),
        kind: MigrationKind::Standard,
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version = current_version(conn)?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        let should_run = match &migration.kind {
            MigrationKind::Standard => true,
            MigrationKind::AddColumn { table, column } => !column_exists(conn, table, column)?,
        };

        if should_run {
            conn.execute_batch(migration.sql)
                .map_err(|e| DatabaseError::Migration {
                    version: migration.version,
                    reason: e.to_string(),
                })?;
        } else {
            log::info!(
                "Skipping migration v{} (condition not met)",
                migration.version
            );
        }

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

/// Returns the highest applied migration version, or 0 for an unmigrated database.
pub fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let has_table: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_migrations')",
        [],
        |r| r.get(0),
    )?;
    if !has_table {
        return Ok(0);
    }

    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?)
}

/// Version the schema reaches once every migration has been applied.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Checks whether a column exists on a table using `PRAGMA table_info`.
fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    // Only alphanumeric and underscores in identifiers.
    if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("Invalid table name: {}", table),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .any(|r| r.map(|name| name == column).unwrap_or(false));
    Ok(exists)
}
