//! Vector index abstraction and backends.
//!
//! The sync engine only ever talks to a [`VectorIndex`]: upsert records,
//! delete by id or by document path, similarity search. Two backends:
//! - **[`SqliteIndex`]** — vectors stored as little-endian f32 BLOBs in a
//!   SQLite table, brute-force cosine similarity at query time.
//! - **[`MemoryIndex`]** — `HashMap` behind `RwLock`, used in tests.
//!
//! Failures are tagged: [`IndexError::Connection`] is fatal for a whole
//! sync run, [`IndexError::DimensionMismatch`] is non-retryable and
//! surfaced immediately.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Vector index failure, tagged by cause.
#[derive(Debug)]
pub enum IndexError {
    /// Index unreachable; fatal for the run.
    Connection(String),
    /// Record vector length does not match the index dimensionality.
    DimensionMismatch { expected: usize, got: usize },
    /// Other storage-level failure.
    Storage(String),
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::Connection(e) => write!(f, "vector index unreachable: {}", e),
            IndexError::DimensionMismatch { expected, got } => {
                write!(f, "dimension mismatch: index has {}, got {}", expected, got)
            }
            IndexError::Storage(e) => write!(f, "vector index storage error: {}", e),
        }
    }
}

impl std::error::Error for IndexError {}

/// A stored (vector, payload) pair with a stable id.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub path: String,
    pub chunk_index: i64,
    pub text: String,
    pub vector: Vec<f32>,
    pub indexed_at: i64,
}

/// A search hit with its cosine similarity score.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub id: String,
    pub path: String,
    pub chunk_index: i64,
    pub text: String,
    pub score: f32,
}

/// The narrow interface the sync engine and search use.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Cheap connectivity check. Run before any batch work so an
    /// unreachable index aborts the run without touching the ledger.
    async fn ping(&self) -> Result<(), IndexError>;

    /// Insert or replace records by id.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), IndexError>;

    /// Delete records by id. Unknown ids are ignored.
    async fn delete_ids(&self, ids: &[String]) -> Result<(), IndexError>;

    /// Delete every record belonging to a document path.
    async fn delete_path(&self, path: &str) -> Result<(), IndexError>;

    /// Rank stored records by cosine similarity to `vector`, optionally
    /// restricted to one document path.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        path_filter: Option<&str>,
    ) -> Result<Vec<ScoredRecord>, IndexError>;

    /// Total number of stored records.
    async fn count(&self) -> Result<u64, IndexError>;
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`. Empty or mismatched vectors → 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

fn check_dims(expected: usize, records: &[VectorRecord]) -> Result<(), IndexError> {
    for r in records {
        if r.vector.len() != expected {
            return Err(IndexError::DimensionMismatch {
                expected,
                got: r.vector.len(),
            });
        }
    }
    Ok(())
}

// ============ SQLite backend ============

/// SQLite-backed vector index. WAL journal, created on demand.
pub struct SqliteIndex {
    pool: SqlitePool,
    dims: usize,
}

fn storage_err(e: sqlx::Error) -> IndexError {
    IndexError::Storage(e.to_string())
}

impl SqliteIndex {
    /// Open (or create) the index database at `path`.
    pub async fn connect(path: &Path, dims: usize) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| IndexError::Connection(e.to_string()))?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| IndexError::Connection(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| IndexError::Connection(e.to_string()))?;

        Ok(Self { pool, dims })
    }

    /// Create the schema. Idempotent.
    pub async fn init_schema(&self) -> Result<(), IndexError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vectors (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                indexed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_path ON vectors(path)")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn ping(&self) -> Result<(), IndexError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), IndexError> {
        check_dims(self.dims, records)?;

        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO vectors (id, path, chunk_index, text, embedding, indexed_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    path = excluded.path,
                    chunk_index = excluded.chunk_index,
                    text = excluded.text,
                    embedding = excluded.embedding,
                    indexed_at = excluded.indexed_at
                "#,
            )
            .bind(&record.id)
            .bind(&record.path)
            .bind(record.chunk_index)
            .bind(&record.text)
            .bind(vec_to_blob(&record.vector))
            .bind(record.indexed_at)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<(), IndexError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        for id in ids {
            sqlx::query("DELETE FROM vectors WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    async fn delete_path(&self, path: &str) -> Result<(), IndexError> {
        sqlx::query("DELETE FROM vectors WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        path_filter: Option<&str>,
    ) -> Result<Vec<ScoredRecord>, IndexError> {
        let rows = match path_filter {
            Some(p) => sqlx::query(
                "SELECT id, path, chunk_index, text, embedding FROM vectors WHERE path = ?",
            )
            .bind(p)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?,
            None => sqlx::query("SELECT id, path, chunk_index, text, embedding FROM vectors")
                .fetch_all(&self.pool)
                .await
                .map_err(storage_err)?,
        };

        let mut scored: Vec<ScoredRecord> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ScoredRecord {
                    id: row.get("id"),
                    path: row.get("path"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    score: cosine_similarity(vector, &blob_to_vec(&blob)),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn count(&self) -> Result<u64, IndexError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(count as u64)
    }
}

// ============ In-memory backend ============

/// In-memory index for tests. Tracks mutation counts so tests can assert
/// that an idempotent second run touched nothing.
pub struct MemoryIndex {
    records: RwLock<HashMap<String, VectorRecord>>,
    dims: usize,
    mutations: AtomicU64,
}

impl MemoryIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            dims,
            mutations: AtomicU64::new(0),
        }
    }

    /// Number of upsert/delete calls that changed state.
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    /// All record ids for a path, in chunk order.
    pub fn ids_for_path(&self, path: &str) -> Vec<String> {
        let records = self.records.read().unwrap();
        let mut found: Vec<&VectorRecord> =
            records.values().filter(|r| r.path == path).collect();
        found.sort_by_key(|r| r.chunk_index);
        found.iter().map(|r| r.id.clone()).collect()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ping(&self) -> Result<(), IndexError> {
        Ok(())
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), IndexError> {
        check_dims(self.dims, records)?;
        let mut stored = self.records.write().unwrap();
        for r in records {
            stored.insert(r.id.clone(), r.clone());
        }
        if !records.is_empty() {
            self.mutations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<(), IndexError> {
        let mut stored = self.records.write().unwrap();
        let mut removed = false;
        for id in ids {
            removed |= stored.remove(id).is_some();
        }
        if removed {
            self.mutations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn delete_path(&self, path: &str) -> Result<(), IndexError> {
        let mut stored = self.records.write().unwrap();
        let before = stored.len();
        stored.retain(|_, r| r.path != path);
        if stored.len() != before {
            self.mutations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        path_filter: Option<&str>,
    ) -> Result<Vec<ScoredRecord>, IndexError> {
        let stored = self.records.read().unwrap();
        let mut scored: Vec<ScoredRecord> = stored
            .values()
            .filter(|r| path_filter.map(|p| r.path == p).unwrap_or(true))
            .map(|r| ScoredRecord {
                id: r.id.clone(),
                path: r.path.clone(),
                chunk_index: r.chunk_index,
                text: r.text.clone(),
                score: cosine_similarity(vector, &r.vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn count(&self) -> Result<u64, IndexError> {
        Ok(self.records.read().unwrap().len() as u64)
    }
}
