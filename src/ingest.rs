//! Ingestion pipeline.
//!
//! load documents → chunk each page → embed in batches → write a fresh
//! index. The index metadata is written last, so an interrupted run leaves
//! an index that serving refuses to open.

use std::path::PathBuf;

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::IngestError;
use crate::index::{IndexMeta, SqliteIndex};
use crate::loader::{load_documents, LoadedDocuments};
use crate::models::Chunk;

/// Counts reported at the end of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub documents: usize,
    pub pages: usize,
    pub chunks: usize,
    pub skipped: usize,
    /// `provider/model/dims`, or `None` for a dry run.
    pub embedding: Option<String>,
    pub index_path: PathBuf,
}

/// Chunk, embed and persist already-loaded documents into a new index.
pub async fn build_index(
    config: &Config,
    loaded: &LoadedDocuments,
    embedder: &dyn EmbeddingProvider,
) -> Result<IngestReport, IngestError> {
    let max_tokens = config.chunking.max_tokens;
    let overlap = config.chunking.overlap_tokens;
    let batch_size = config.embedding.batch_size.max(1);

    let index = SqliteIndex::create(&config.storage.dir)
        .await
        .map_err(IngestError::Storage)?;

    let mut chunks_written = 0;
    for doc in &loaded.documents {
        index
            .insert_document(doc)
            .await
            .map_err(IngestError::Storage)?;

        let chunks = chunk_document(doc, max_tokens, overlap);
        for batch in chunks.chunks(batch_size) {
            let vectors = embed_batch(embedder, batch).await?;
            index
                .insert_chunks(batch, &vectors)
                .await
                .map_err(IngestError::Storage)?;
        }
        tracing::info!("indexed {} ({} chunks)", doc.relative_path, chunks.len());
        chunks_written += chunks.len();
    }

    index
        .write_meta(&IndexMeta::new(embedder, &config.chunking))
        .await
        .map_err(IngestError::Storage)?;
    let index_path = index.path().to_path_buf();
    index.close().await;

    Ok(IngestReport {
        documents: loaded.documents.len(),
        pages: loaded.page_count(),
        chunks: chunks_written,
        skipped: loaded.skipped.len(),
        embedding: Some(embedding::signature(embedder)),
        index_path,
    })
}

async fn embed_batch(
    embedder: &dyn EmbeddingProvider,
    batch: &[Chunk],
) -> Result<Vec<Vec<f32>>, IngestError> {
    let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
    embedder.embed(&texts).await.map_err(IngestError::Embedding)
}

/// Load and count without embedding or writing anything.
pub fn plan_ingest(config: &Config) -> Result<IngestReport, IngestError> {
    let loaded = load_documents(&config.ingest)?;
    let chunks = loaded
        .documents
        .iter()
        .map(|d| {
            chunk_document(d, config.chunking.max_tokens, config.chunking.overlap_tokens).len()
        })
        .sum();
    Ok(IngestReport {
        documents: loaded.documents.len(),
        pages: loaded.page_count(),
        chunks,
        skipped: loaded.skipped.len(),
        embedding: None,
        index_path: config.storage.index_path(),
    })
}

/// `ragchat ingest`: build the index from `ingest.data_dir` and print a summary.
pub async fn run_ingest(config: &Config, dry_run: bool) -> Result<IngestReport, IngestError> {
    if dry_run {
        let report = plan_ingest(config)?;
        println!("ingest {} (dry-run)", config.ingest.data_dir.display());
        println!("  documents: {}", report.documents);
        println!("  pages: {}", report.pages);
        println!("  estimated chunks: {}", report.chunks);
        if report.skipped > 0 {
            println!("  skipped files: {}", report.skipped);
        }
        return Ok(report);
    }

    let loaded = load_documents(&config.ingest)?;
    let embedder =
        embedding::create_provider(&config.embedding).map_err(IngestError::InvalidConfig)?;
    tracing::info!(
        "embedding {} documents with {}",
        loaded.documents.len(),
        embedding::signature(embedder.as_ref())
    );
    let report = build_index(config, &loaded, embedder.as_ref()).await?;

    println!("ingest {}", config.ingest.data_dir.display());
    println!("  documents: {}", report.documents);
    println!("  pages: {}", report.pages);
    println!("  chunks: {}", report.chunks);
    if report.skipped > 0 {
        println!("  skipped files: {}", report.skipped);
    }
    if let Some(sig) = &report.embedding {
        println!("  embedding: {}", sig);
    }
    println!("  index: {}", report.index_path.display());
    println!("ok");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::VectorSearch;
    use async_trait::async_trait;

    struct LengthEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        fn provider_name(&self) -> &str {
            "test"
        }
        fn model_name(&self) -> &str {
            "length"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            if self.fail {
                anyhow::bail!("model unavailable");
            }
            Ok(texts
                .iter()
                .map(|t| vec![1.0, t.len() as f32 / 100.0])
                .collect())
        }
    }

    fn config_in(root: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.ingest.data_dir = root.join("data");
        config.storage.dir = root.join("storage");
        config.embedding.batch_size = 1;
        std::fs::create_dir_all(&config.ingest.data_dir).unwrap();
        std::fs::write(config.ingest.data_dir.join("a.txt"), "alpha\n\nbeta").unwrap();
        std::fs::write(config.ingest.data_dir.join("b.md"), "gamma").unwrap();
        config
    }

    #[tokio::test]
    async fn test_build_index_writes_every_chunk() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let loaded = load_documents(&config.ingest).unwrap();

        let report = build_index(&config, &loaded, &LengthEmbedder { fail: false })
            .await
            .unwrap();
        assert_eq!(report.documents, 2);
        assert_eq!(report.chunks, 2);
        assert_eq!(report.embedding.as_deref(), Some("test/length/2"));

        let index = SqliteIndex::open(&config.storage.dir).await.unwrap();
        assert_eq!(index.stats().await.unwrap().vectors, 2);
        assert_eq!(index.search(&[1.0, 0.0], 5).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts_without_meta() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let loaded = load_documents(&config.ingest).unwrap();

        let err = build_index(&config, &loaded, &LengthEmbedder { fail: true })
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Embedding(_)));

        let index = SqliteIndex::open(&config.storage.dir).await.unwrap();
        assert!(index.meta().await.is_err());
    }

    #[test]
    fn test_plan_counts_without_writing() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let report = plan_ingest(&config).unwrap();
        assert_eq!(report.documents, 2);
        assert_eq!(report.pages, 2);
        assert_eq!(report.chunks, 2);
        assert!(report.embedding.is_none());
        assert!(!config.storage.dir.exists());
    }
}
