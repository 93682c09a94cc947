//! SQLite connection setup shared by the task queue and the review queue.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Current schema version (stored in `PRAGMA user_version`)
pub const SCHEMA_VERSION: i32 = 2;

const SCHEMA: &str = include_str!("../schema.sql");

/// How long a connection waits on a lock held by another connection
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let is_new = !path.exists();

        debug!(path = %path.display(), "Opening database");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        // Task and review connections share the file
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode")?;
        Self::configure(&conn)?;

        let mut db = Self { conn };

        if is_new {
            info!("Creating new database schema");
            db.create_schema()?;
        } else {
            debug!("Database already exists");
            db.run_migrations()?;
        }

        Ok(db)
    }

    /// Open a private in-memory database with the full schema
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::configure(&conn)?;

        let mut db = Self { conn };
        db.create_schema()?;
        Ok(db)
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.execute("PRAGMA foreign_keys = ON", [])
            .context("Failed to enable foreign keys")?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set busy timeout")?;
        Ok(())
    }

    /// Apply `schema.sql`. Every statement is `IF NOT EXISTS`, so this also
    /// brings older databases up to date.
    fn create_schema(&mut self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("Failed to create database schema")?;
        self.set_user_version(SCHEMA_VERSION)?;

        info!(version = SCHEMA_VERSION, "Database schema ready");
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn has_table(&self, name: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn user_version(&self) -> Result<i32> {
        Ok(self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?)
    }

    pub fn set_user_version(&self, version: i32) -> Result<()> {
        self.conn.pragma_update(None, "user_version", version)?;
        Ok(())
    }

    /// Version 1 databases predate `review_queue`
    fn run_migrations(&mut self) -> Result<()> {
        let from = self.user_version()?;
        if from >= SCHEMA_VERSION {
            return Ok(());
        }

        info!(from, to = SCHEMA_VERSION, "Migrating database schema");
        self.create_schema()
    }
}
