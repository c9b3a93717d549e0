//! SQLite implementation of [`ICursorStore`]
//!
//! Cursors live in a single `cursors` table keyed by feed URI. The save is a
//! single conditional upsert, so the monotonic check and the write happen
//! atomically inside SQLite even when several feed tasks share the pool.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use trs_core::domain::{Cursor, SequenceId};
use trs_core::ports::{ICursorStore, StoreError};
use url::Url;

use crate::CacheError;

/// Inserts a cursor, or updates it only if the sequence does not go down.
/// A NULL position is only ever replaced, never written over a real one.
const UPSERT_CURSOR: &str = r#"
    INSERT INTO cursors (feed_uri, last_applied, updated_at)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(feed_uri) DO UPDATE SET
        last_applied = excluded.last_applied,
        updated_at = excluded.updated_at
    WHERE cursors.last_applied IS NULL
       OR (excluded.last_applied IS NOT NULL
           AND excluded.last_applied >= cursors.last_applied)
"#;

/// SQLite-backed cursor store
#[derive(Debug, Clone)]
pub struct SqliteCursorStore {
    pool: SqlitePool,
}

impl SqliteCursorStore {
    /// Creates a store over an existing pool (see [`DatabasePool`](crate::DatabasePool))
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_row(&self, feed_uri: &Url) -> Result<Option<Cursor>, CacheError> {
        let row = sqlx::query(
            "SELECT feed_uri, last_applied, updated_at FROM cursors WHERE feed_uri = ?1",
        )
        .bind(feed_uri.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(cursor_from_row).transpose()
    }
}

#[async_trait::async_trait]
impl ICursorStore for SqliteCursorStore {
    async fn load(&self, feed_uri: &Url) -> Result<Option<Cursor>, StoreError> {
        Ok(self.load_row(feed_uri).await?)
    }

    async fn save(&self, cursor: &Cursor) -> Result<(), StoreError> {
        let last_applied = cursor.last_applied().map(sequence_to_sql).transpose()?;

        let result = sqlx::query(UPSERT_CURSOR)
            .bind(cursor.feed_uri().as_str())
            .bind(last_applied)
            .bind(cursor.updated_at().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(CacheError::from)?;

        if result.rows_affected() == 0 {
            let stored = self
                .load_row(cursor.feed_uri())
                .await?
                .and_then(|c| c.last_applied())
                .unwrap_or(SequenceId::ZERO);
            let attempted = cursor.last_applied().unwrap_or(SequenceId::ZERO);
            tracing::warn!(
                feed = %cursor.feed_uri(),
                %stored,
                %attempted,
                "Rejected backwards cursor write"
            );
            return Err(StoreError::StaleWrite { stored, attempted });
        }

        tracing::trace!(
            feed = %cursor.feed_uri(),
            last_applied = ?cursor.last_applied(),
            "Saved cursor"
        );
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Cursor>, StoreError> {
        let rows = sqlx::query(
            "SELECT feed_uri, last_applied, updated_at FROM cursors ORDER BY feed_uri",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(CacheError::from)?;

        rows.iter()
            .map(|row| cursor_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn remove(&self, feed_uri: &Url) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM cursors WHERE feed_uri = ?1")
            .bind(feed_uri.as_str())
            .execute(&self.pool)
            .await
            .map_err(CacheError::from)?;

        let removed = result.rows_affected() > 0;
        if removed {
            tracing::info!(feed = %feed_uri, "Removed cursor");
        }
        Ok(removed)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn cursor_from_row(row: &SqliteRow) -> Result<Cursor, CacheError> {
    let feed_uri_str: String = row.try_get("feed_uri")?;
    let last_applied: Option<i64> = row.try_get("last_applied")?;
    let updated_at_str: String = row.try_get("updated_at")?;

    let feed_uri = Url::parse(&feed_uri_str).map_err(|e| {
        CacheError::InvalidValue(format!("Invalid feed URI '{}': {}", feed_uri_str, e))
    })?;
    let last_applied = last_applied.map(sequence_from_sql).transpose()?;
    let updated_at = parse_datetime(&updated_at_str)?;

    Ok(Cursor::from_parts(feed_uri, last_applied, updated_at))
}

/// SQLite integers are signed; sequence ids above `i64::MAX` are not storable
fn sequence_to_sql(seq: SequenceId) -> Result<i64, CacheError> {
    i64::try_from(seq.value()).map_err(|_| {
        CacheError::InvalidValue(format!("Sequence id {} exceeds storable range", seq))
    })
}

fn sequence_from_sql(value: i64) -> Result<SequenceId, CacheError> {
    u64::try_from(value)
        .map(SequenceId::new)
        .map_err(|_| CacheError::InvalidValue(format!("Negative sequence id {}", value)))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CacheError::InvalidValue(format!("Failed to parse datetime '{}': {}", s, e))
        })
}
