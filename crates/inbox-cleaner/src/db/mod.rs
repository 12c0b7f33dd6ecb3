//! Database module for persistent storage.
//!
//! Uses rusqlite (SQLite) with a thread-safe `Database` handle.
//! All access is serialized through a `Mutex<Connection>`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, Transaction};

pub mod audit_repo;
pub mod error;
pub mod message_repo;
pub mod migrations;
pub mod oauth_repo;
pub mod sender_repo;
pub mod stats_repo;

pub use error::DatabaseError;

/// Where the SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// A private in-memory database.
    Memory,
    /// A database file on disk.
    File(PathBuf),
}

/// Thread-safe database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap (inner `Arc`). All access is serialized through
/// a `Mutex`, which is fine for SQLite (which serializes writes anyway).
/// WAL mode is enabled for concurrent read performance.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Self::open_file(path, true)
    }

    /// Opens an in-memory database for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        Ok(Self::from_connection(conn))
    }

    /// Opens the database at `location`. Migrations only run when
    /// `run_migrations` is set; otherwise the schema is expected to be
    /// managed out of band and a missing schema is logged.
    pub fn open_location(
        location: &DatabaseLocation,
        run_migrations: bool,
    ) -> Result<Self, DatabaseError> {
        match location {
            DatabaseLocation::Memory => {
                let conn = Connection::open_in_memory()?;
                conn.execute_batch("PRAGMA foreign_keys=ON;")?;
                // An in-memory database has no schema unless we create it here.
                migrations::run_all(&conn)?;
                Ok(Self::from_connection(conn))
            }
            DatabaseLocation::File(path) => Self::open_file(path, run_migrations),
        }
    }

    fn open_file(path: &Path, run_migrations: bool) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        if run_migrations {
            migrations::run_all(&conn)?;
        } else {
            let version = migrations::current_version(&conn)?;
            if version < migrations::latest_version() {
                log::warn!(
                    "Database schema at v{} but v{} is expected; run migrations before serving",
                    version,
                    migrations::latest_version()
                );
            }
        }

        log::info!("Database opened at {}", path.display());

        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs `f` inside a single transaction.
    ///
    /// The transaction commits only when `f` returns `Ok`. Any error drops
    /// the transaction, which rolls back everything `f` staged.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DatabaseError>,
    {
        let mut conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}
