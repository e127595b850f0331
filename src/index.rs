//! Persisted vector index.
//!
//! The index is a single SQLite file (`index.sqlite`) in the storage
//! directory. Ingestion creates it from scratch with [`SqliteIndex::create`];
//! serving opens it read-only with [`SqliteIndex::open`] and never writes.
//!
//! Search is exact: every stored vector is compared against the query by
//! cosine similarity and the best `top_k` are returned in descending score
//! order.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::{ChunkingConfig, INDEX_FILE};
use crate::db;
use crate::embedding::{self, blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingProvider};
use crate::migrate;
use crate::models::{Chunk, Document};

/// Build parameters recorded alongside the data.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMeta {
    pub embedding_provider: String,
    pub embedding_model: String,
    pub dims: usize,
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    /// RFC 3339 build time.
    pub built_at: String,
    /// Version of the crate that wrote the index.
    pub version: String,
}

impl IndexMeta {
    pub fn new(embedder: &dyn EmbeddingProvider, chunking: &ChunkingConfig) -> Self {
        Self {
            embedding_provider: embedder.provider_name().to_string(),
            embedding_model: embedder.model_name().to_string(),
            dims: embedder.dims(),
            max_tokens: chunking.max_tokens,
            overlap_tokens: chunking.overlap_tokens,
            built_at: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Same format as [`embedding::signature`].
    pub fn embedder_signature(&self) -> String {
        format!(
            "{}/{}/{}",
            self.embedding_provider, self.embedding_model, self.dims
        )
    }

    fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("embedding_provider", self.embedding_provider.clone()),
            ("embedding_model", self.embedding_model.clone()),
            ("embedding_dims", self.dims.to_string()),
            ("chunk_max_tokens", self.max_tokens.to_string()),
            ("chunk_overlap_tokens", self.overlap_tokens.to_string()),
            ("built_at", self.built_at.clone()),
            ("version", self.version.clone()),
        ]
    }

    fn from_pairs(mut pairs: HashMap<String, String>) -> Result<Self> {
        let mut take = |key: &str| {
            pairs
                .remove(key)
                .ok_or_else(|| anyhow::anyhow!("index_meta is missing '{}'", key))
        };
        Ok(Self {
            embedding_provider: take("embedding_provider")?,
            embedding_model: take("embedding_model")?,
            dims: take("embedding_dims")?
                .parse()
                .context("index_meta embedding_dims is not a number")?,
            max_tokens: take("chunk_max_tokens")?
                .parse()
                .context("index_meta chunk_max_tokens is not a number")?,
            overlap_tokens: take("chunk_overlap_tokens")?
                .parse()
                .context("index_meta chunk_overlap_tokens is not a number")?,
            built_at: take("built_at")?,
            version: take("version")?,
        })
    }
}

/// A chunk returned by a search, with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub file_name: String,
    pub page_label: Option<String>,
    pub text: String,
    pub score: f64,
}

/// Nearest-neighbour search over stored chunk vectors.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// The `top_k` most similar chunks, best first.
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexStats {
    pub documents: i64,
    pub pages: i64,
    pub chunks: i64,
    pub vectors: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileStats {
    pub relative_path: String,
    pub page_count: i64,
    pub chunk_count: i64,
}

pub struct SqliteIndex {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteIndex {
    /// Start a new, empty index in `storage_dir`, replacing any existing one.
    pub async fn create(storage_dir: &Path) -> Result<Self> {
        let path = storage_dir.join(INDEX_FILE);
        for stale in [path.clone(), path.with_extension("sqlite-journal")] {
            if stale.exists() {
                std::fs::remove_file(&stale)
                    .with_context(|| format!("Failed to remove old index {}", stale.display()))?;
            }
        }

        let pool = db::connect(&path, false).await?;
        migrate::create_schema(&pool).await?;
        Ok(Self { pool, path })
    }

    /// Open an existing index read-only.
    pub async fn open(storage_dir: &Path) -> Result<Self> {
        let path = storage_dir.join(INDEX_FILE);
        if !path.is_file() {
            bail!("index file {} does not exist", path.display());
        }
        let pool = db::connect(&path, true).await?;
        Ok(Self { pool, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write_meta(&self, meta: &IndexMeta) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in meta.to_pairs() {
            sqlx::query(
                "INSERT INTO index_meta (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn meta(&self) -> Result<IndexMeta> {
        let rows = sqlx::query("SELECT key, value FROM index_meta")
            .fetch_all(&self.pool)
            .await
            .context("Failed to read index_meta")?;
        let pairs = rows
            .iter()
            .map(|row| (row.get::<String, _>("key"), row.get::<String, _>("value")))
            .collect();
        IndexMeta::from_pairs(pairs)
    }

    pub async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (id, file_name, relative_path, content_type, page_count, modified_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&doc.id)
        .bind(&doc.file_name)
        .bind(&doc.relative_path)
        .bind(&doc.content_type)
        .bind(doc.pages.len() as i64)
        .bind(doc.modified_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert document {}", doc.relative_path))?;
        Ok(())
    }

    /// Insert chunks and their vectors in one transaction.
    pub async fn insert_chunks(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != vectors.len() {
            bail!(
                "{} chunks but {} vectors; refusing to write a partial index",
                chunks.len(),
                vectors.len()
            );
        }

        let mut tx = self.pool.begin().await?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, chunk_index, page_label, text, hash)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.page_label)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chunk_vectors (chunk_id, embedding) VALUES (?, ?)")
                .bind(&chunk.id)
                .bind(vec_to_blob(vector))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let pages: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(page_count), 0) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let vectors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(IndexStats {
            documents,
            pages,
            chunks,
            vectors,
        })
    }

    /// Per-document page and chunk counts, ordered by path.
    pub async fn file_breakdown(&self) -> Result<Vec<FileStats>> {
        let rows = sqlx::query(
            r#"
            SELECT d.relative_path, d.page_count, COUNT(c.id) AS chunk_count
            FROM documents d
            LEFT JOIN chunks c ON c.document_id = d.id
            GROUP BY d.id
            ORDER BY d.relative_path
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| FileStats {
                relative_path: row.get("relative_path"),
                page_count: row.get("page_count"),
                chunk_count: row.get("chunk_count"),
            })
            .collect())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorSearch for SqliteIndex {
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        // Fetch all vectors and compute cosine similarity in Rust
        let rows = sqlx::query(
            r#"
            SELECT c.id AS chunk_id, d.file_name, c.page_label, c.text, cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            JOIN documents d ON d.id = c.document_id
            ORDER BY d.relative_path, c.chunk_index
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to read chunk vectors")?;

        let mut results: Vec<RetrievedChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                RetrievedChunk {
                    chunk_id: row.get("chunk_id"),
                    file_name: row.get("file_name"),
                    page_label: row.get("page_label"),
                    text: row.get("text"),
                    score: cosine_similarity(query, &blob_to_vec(&blob)) as f64,
                }
            })
            .collect();

        // Stable sort keeps index order among equal scores.
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);
        Ok(results)
    }
}

/// Compare the index's recorded embedder against the configured one.
pub fn check_embedder(meta: &IndexMeta, embedder: &dyn EmbeddingProvider) -> Option<(String, String)> {
    let indexed = meta.embedder_signature();
    let configured = embedding::signature(embedder);
    (indexed != configured).then_some((indexed, configured))
}
