//! Vector index abstraction.
//!
//! The [`VectorStore`] trait is the nearest-neighbor contract the rest of
//! the system depends on: upsert, delete (by id or by source path), and
//! top-K similarity query. The core is agnostic to the backend as long as
//! reads observe the single writer's completed writes.
//!
//! Backends:
//! - [`SqliteVectorStore`] — embeddings as little-endian f32 BLOBs in the
//!   shared `index.db`, cosine ranking computed in Rust over the collection.
//! - [`InMemoryVectorStore`] — `RwLock<HashMap>` backend for tests.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};

/// A stored entry: id, owning source path, embedding, and opaque metadata.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    /// Source path for path-keyed deletion; empty for non-file collections.
    pub path: String,
    pub vector: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// One query result, highest similarity first.
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

/// Metadata stored with every code chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMeta {
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub text: String,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, record: VectorRecord) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete every entry whose `path` matches. Deletion during a sync pass
    /// is keyed by path, not chunk identity, so a retried pass converges.
    async fn delete_for_path(&self, path: &str) -> Result<()>;

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<QueryHit>>;

    async fn count(&self) -> Result<usize>;

    /// All stored ids, for consistency checks against the manifest.
    async fn ids(&self) -> Result<Vec<String>>;
}

// ============ SQLite backend ============

/// SQLite-backed store scoped to one named collection.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool, collection: &str) -> Self {
        Self {
            pool,
            collection: collection.to_string(),
        }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        let blob = vec_to_blob(&record.vector);
        let metadata = serde_json::to_string(&record.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO vectors (id, collection, path, embedding, metadata_json)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET
                path = excluded.path,
                embedding = excluded.embedding,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&record.id)
        .bind(&self.collection)
        .bind(&record.path)
        .bind(&blob)
        .bind(&metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM vectors WHERE collection = ? AND id = ?")
            .bind(&self.collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_for_path(&self, path: &str) -> Result<()> {
        sqlx::query("DELETE FROM vectors WHERE collection = ? AND path = ?")
            .bind(&self.collection)
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<QueryHit>> {
        let rows = sqlx::query("SELECT id, embedding, metadata_json FROM vectors WHERE collection = ?")
            .bind(&self.collection)
            .fetch_all(&self.pool)
            .await?;

        let mut hits: Vec<QueryHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                let metadata_json: String = row.get("metadata_json");
                QueryHit {
                    id: row.get("id"),
                    score: cosine_similarity(vector, &stored),
                    metadata: serde_json::from_str(&metadata_json)
                        .unwrap_or(serde_json::json!({})),
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn ids(&self) -> Result<Vec<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM vectors WHERE collection = ? ORDER BY id")
                .bind(&self.collection)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }
}

// ============ In-memory backend ============

/// In-memory store for tests. Brute-force cosine over all entries.
#[derive(Default)]
pub struct InMemoryVectorStore {
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        self.records
            .write()
            .unwrap()
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.records.write().unwrap().remove(id);
        Ok(())
    }

    async fn delete_for_path(&self, path: &str) -> Result<()> {
        self.records.write().unwrap().retain(|_, r| r.path != path);
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<QueryHit>> {
        let records = self.records.read().unwrap();
        let mut hits: Vec<QueryHit> = records
            .values()
            .map(|r| QueryHit {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.vector),
                metadata: r.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().unwrap().len())
    }

    async fn ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.records.read().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
