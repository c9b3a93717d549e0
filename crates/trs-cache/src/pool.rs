//! SQLite pool for the cursor database
//!
//! The schema is versioned with `PRAGMA user_version`. Opening a database
//! brings an older schema up to [`SCHEMA_VERSION`]; a database written by a
//! newer build is refused rather than modified.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::{debug, info};

use crate::CacheError;

/// Schema version this build reads and writes
pub const SCHEMA_VERSION: i64 = 1;

/// Migrations in order; entry `i` upgrades version `i` to `i + 1`
const MIGRATIONS: &[&str] = &[include_str!("migrations/20261019_cursors.sql")];

/// Shared handle to the cursor database
///
/// Cursor writes must survive power loss, so commits are fully synchronous.
/// An in-memory database lives inside its one connection, hence the pool
/// size of 1 in that mode.
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens the database at `db_path`, creating the file and its directory
    ///
    /// # Errors
    ///
    /// `ConnectionFailed` if the file cannot be opened, `MigrationFailed` if
    /// the schema cannot be brought up to date.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                CacheError::ConnectionFailed(format!("cannot create {}: {e}", dir.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("cannot open {}: {e}", db_path.display()))
            })?;

        let this = Self { pool };
        this.migrate().await?;
        info!(path = %db_path.display(), "Cursor database opened");
        Ok(this)
    }

    /// Fresh in-memory database, for tests
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| CacheError::ConnectionFailed(format!("in-memory database: {e}")))?;

        let this = Self { pool };
        this.migrate().await?;
        Ok(this)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Schema version recorded in the database file
    pub async fn schema_version(&self) -> Result<i64, CacheError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }

    /// Waits for in-flight queries, then closes every connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<(), CacheError> {
        let current = self.schema_version().await?;
        if current > SCHEMA_VERSION {
            return Err(CacheError::MigrationFailed(format!(
                "database schema v{current} is newer than supported v{SCHEMA_VERSION}"
            )));
        }

        for (from, sql) in MIGRATIONS.iter().enumerate().skip(current.max(0) as usize) {
            let to = from as i64 + 1;
            // PRAGMA does not take bind parameters
            let script = format!("BEGIN;\n{sql}\nPRAGMA user_version = {to};\nCOMMIT;");
            sqlx::raw_sql(&script)
                .execute(&self.pool)
                .await
                .map_err(|e| CacheError::MigrationFailed(format!("v{from} -> v{to}: {e}")))?;
            debug!(from, to, "Applied schema migration");
        }
        Ok(())
    }
}
