//! The underlying key-value medium: one SQLite table mapping a namespace
//! key to its JSON payload. Nothing in here knows about envelopes or
//! schema versions; that is [`super::Store`]'s job.

use crate::store::StoreError;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use std::path::Path;

#[derive(Clone)]
pub(crate) struct KvStore {
    pool: SqlitePool,
}

impl KvStore {
    pub(crate) async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .create_if_missing(true)
            .filename(path);
        let pool = SqlitePool::connect_with(options).await?;
        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool })
    }

    pub(crate) async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT payload FROM shelf_data WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(payload,)| payload))
    }

    pub(crate) async fn set(&self, key: &str, payload: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO shelf_data (key, payload)
             VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET payload = excluded.payload",
        )
        .bind(key)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(())
    }

    pub(crate) async fn close(&self) {
        self.pool.close().await;
    }
}

/// A full disk is the one write failure the user can actually act on, so
/// it gets its own variant instead of a generic database error.
#[allow(
    clippy::pattern_type_mismatch,
    reason = "False positive, this is the idiomatic pattern"
)]
fn map_write_error(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &error {
        if db_err.message().contains("disk is full") {
            return StoreError::QuotaExceeded;
        }
    }
    StoreError::Db(error)
}
