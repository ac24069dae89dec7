//! Index database connection and schema.
//!
//! One SQLite file (`.bugscout/index.db`, WAL mode) holds every vector
//! collection: code chunks and conversation-turn memory are rows in the same
//! table, keyed by `(collection, id)`.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::error::IndexError;

pub const INDEX_DB_FILE: &str = "index.db";

pub async fn connect(state_dir: &Path) -> Result<SqlitePool> {
    std::fs::create_dir_all(state_dir)?;
    let db_path = state_dir.join(INDEX_DB_FILE);

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .map_err(|e| IndexError::VectorStoreUnavailable(e.to_string()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| IndexError::VectorStoreUnavailable(e.to_string()))?;

    migrate(&pool).await?;
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vectors (
            id TEXT NOT NULL,
            collection TEXT NOT NULL,
            path TEXT NOT NULL DEFAULT '',
            embedding BLOB NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_path ON vectors(collection, path)")
        .execute(pool)
        .await?;

    Ok(())
}
