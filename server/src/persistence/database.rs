//! SQLite connection pool, migration runner, and an additive-column pass
//! for multiplayer fields.
//!
//! Grounded in the teacher's
//! `examples/benediktms-chesstty/server/src/persistence/sqlite/database.rs`
//! (pool setup, WAL mode, embedded `sqlx::migrate!`) and in
//! `examples/original_source/backend/app/migrations.py`'s
//! `ensure_multiplayer_columns`, which inspects `PRAGMA table_info` and
//! issues `ALTER TABLE ... ADD COLUMN` for anything missing.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::error::PersistenceError;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn open(database_url: &str) -> Result<Self, PersistenceError> {
        if let Some(path) = database_url.strip_prefix("sqlite:") {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| PersistenceError::Backend(e.to_string()))?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| PersistenceError::Backend(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;

        let db = Self { pool };
        db.run_migrations().await?;
        db.ensure_multiplayer_columns().await?;
        Ok(db)
    }

    #[cfg(test)]
    pub async fn new_in_memory() -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| PersistenceError::Backend(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), PersistenceError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        Ok(())
    }

    /// Idempotent: adds any of the multiplayer columns to `sessions` that
    /// an older database file was created without. A fresh database
    /// already has every column from `0001_init.sql`, so this is a no-op
    /// there; it only does work against a database file from before these
    /// columns existed.
    async fn ensure_multiplayer_columns(&self) -> Result<(), PersistenceError> {
        let rows: Vec<(i64, String, String, i64, Option<String>, i64)> =
            sqlx::query_as("PRAGMA table_info(sessions)")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        let existing: std::collections::HashSet<String> = rows.into_iter().map(|r| r.1).collect();

        let additions: &[(&str, &str)] = &[
            ("player_white_id", "TEXT"),
            ("player_black_id", "TEXT"),
            ("is_multiplayer", "BOOLEAN NOT NULL DEFAULT 0"),
            ("result", "TEXT"),
            ("winner", "TEXT"),
        ];

        for (column, ddl) in additions {
            if !existing.contains(*column) {
                let stmt = format!("ALTER TABLE sessions ADD COLUMN {column} {ddl}");
                sqlx::query(&stmt).execute(&self.pool).await.map_err(|e| PersistenceError::Backend(e.to_string()))?;
            }
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory_runs_migrations() {
        let db = Database::new_in_memory().await.unwrap();
        let tables: Vec<(String,)> = sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(db.pool())
            .await
            .unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert!(names.contains(&"sessions"));
        assert!(names.contains(&"move_log"));
        assert!(names.contains(&"opponent_profiles"));
    }

    #[tokio::test]
    async fn test_ensure_multiplayer_columns_is_idempotent_on_fresh_db() {
        let db = Database::new_in_memory().await.unwrap();
        db.ensure_multiplayer_columns().await.unwrap();
        db.ensure_multiplayer_columns().await.unwrap();
    }
}
