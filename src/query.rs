//! Retrieval and answering.
//!
//! [`Retriever`] embeds a query, searches the index and applies the
//! similarity cutoff. [`QueryEngine`] adds the guardrail, the prompt and the
//! LLM call, and turns the retained chunks into [`Citation`]s.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{QueryError, StartupError};
use crate::index::{self, RetrievedChunk, SqliteIndex, VectorSearch};
use crate::llm::{ChatCompletionsClient, LlmClient};
use crate::prompt::{build_context, PromptTemplate};

/// Answer returned when no chunk survives the similarity cutoff.
pub const NOT_FOUND_MESSAGE: &str =
    "I couldn't find any relevant information in the documents to answer that question.";

/// Maximum characters of chunk text quoted in a citation.
pub const SNIPPET_CHARS: usize = 200;
const ELLIPSIS: &str = "...";

/// Page reported for chunks from formats without pages.
pub const NO_PAGE: &str = "N/A";

/// One retained chunk, as shown to the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    pub file: String,
    pub page: String,
    pub text: String,
    pub score: f64,
}

impl Citation {
    pub fn from_chunk(chunk: &RetrievedChunk) -> Self {
        Self {
            file: chunk.file_name.clone(),
            page: chunk
                .page_label
                .clone()
                .unwrap_or_else(|| NO_PAGE.to_string()),
            text: snippet(&chunk.text),
            score: round2(chunk.score),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub response: String,
    pub sources: Vec<Citation>,
}

impl Answer {
    pub fn not_found() -> Self {
        Self {
            response: NOT_FOUND_MESSAGE.to_string(),
            sources: Vec::new(),
        }
    }
}

/// First [`SNIPPET_CHARS`] characters, with `...` appended if anything was cut.
pub fn snippet(text: &str) -> String {
    match text.char_indices().nth(SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
        None => text.to_string(),
    }
}

fn round2(score: f64) -> f64 {
    if score.is_finite() {
        (score * 100.0).round() / 100.0
    } else {
        0.0
    }
}

/// Nearest-neighbour retrieval with an optional similarity cutoff.
pub struct Retriever {
    index: Arc<dyn VectorSearch>,
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
    similarity_cutoff: Option<f64>,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorSearch>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index,
            embedder,
            top_k: 2,
            similarity_cutoff: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_similarity_cutoff(mut self, cutoff: Option<f64>) -> Self {
        self.similarity_cutoff = cutoff;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Open the persisted index and pair it with the configured embedder.
    ///
    /// Fails if the index is missing or was built with a different embedder.
    /// The embedder is built without retries.
    pub async fn from_config(config: &Config) -> Result<Self, StartupError> {
        require_index(config)?;
        let embedder = query_embedder(config)?;
        Self::open_with(config, embedder).await
    }

    /// Like [`Retriever::from_config`] with a caller-supplied embedder.
    ///
    /// The embedder is exercised once before returning, so a model that
    /// cannot load fails here rather than on the first query.
    pub async fn open_with(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, StartupError> {
        require_index(config)?;
        let sqlite = SqliteIndex::open(&config.storage.dir)
            .await
            .map_err(StartupError::Index)?;
        let meta = sqlite
            .meta()
            .await
            .context("index is incomplete; re-run `ragchat ingest`")
            .map_err(StartupError::Index)?;
        if let Some((indexed, configured)) = index::check_embedder(&meta, embedder.as_ref()) {
            return Err(StartupError::EmbeddingMismatch {
                indexed,
                configured,
            });
        }
        // Local models load lazily; force the load (or download) now.
        embedding::embed_query(embedder.as_ref(), "warmup")
            .await
            .map_err(StartupError::EmbedderUnavailable)?;
        tracing::info!(
            "loaded index {} (built {} with {})",
            sqlite.path().display(),
            meta.built_at,
            meta.embedder_signature()
        );

        Ok(Self::new(Arc::new(sqlite), embedder)
            .with_top_k(config.retrieval.top_k)
            .with_similarity_cutoff(config.retrieval.similarity_cutoff))
    }

    /// Top-k chunks for `query`, best first, with those below the cutoff removed.
    pub async fn retrieve(&self, query: &str) -> anyhow::Result<Vec<RetrievedChunk>> {
        let query_vec = embedding::embed_query(self.embedder.as_ref(), query).await?;
        let mut results = self.index.search(&query_vec, self.top_k).await?;
        if let Some(cutoff) = self.similarity_cutoff {
            results.retain(|r| r.score >= cutoff);
        }
        Ok(results)
    }
}

/// The configured embedder, without retries.
fn query_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>, StartupError> {
    let mut embedding_config = config.embedding.clone();
    embedding_config.max_retries = 0;
    embedding::create_provider(&embedding_config).map_err(StartupError::InvalidConfig)
}

fn require_index(config: &Config) -> Result<(), StartupError> {
    let path = config.storage.index_path();
    if !config.storage.dir.is_dir() || !path.is_file() {
        return Err(StartupError::IndexMissing { path });
    }
    Ok(())
}

/// Retrieval plus generation.
pub struct QueryEngine {
    retriever: Retriever,
    llm: Arc<dyn LlmClient>,
    template: PromptTemplate,
}

impl QueryEngine {
    pub fn new(retriever: Retriever, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            retriever,
            llm,
            template: PromptTemplate::default(),
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Build a ready engine: index present, LLM key present, index opened
    /// and matched against the embedder.
    pub async fn from_config(config: &Config) -> Result<Self, StartupError> {
        require_index(config)?;
        let embedder = query_embedder(config)?;
        let llm = ChatCompletionsClient::from_config(&config.llm)?;
        let template = config
            .prompt
            .build()
            .map_err(StartupError::InvalidConfig)?;
        let retriever = Retriever::open_with(config, embedder).await?;
        tracing::info!(
            "query engine ready: llm {}, top_k {}, cutoff {:?}",
            llm.model(),
            retriever.top_k(),
            retriever.similarity_cutoff
        );
        Ok(Self::new(retriever, Arc::new(llm)).with_template(template))
    }

    pub async fn answer(&self, query: &str) -> Result<Answer, QueryError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let chunks = self
            .retriever
            .retrieve(trimmed)
            .await
            .map_err(QueryError::Retrieval)?;
        if chunks.is_empty() {
            tracing::info!("no chunk passed the similarity cutoff; answering not-found");
            return Ok(Answer::not_found());
        }

        let prompt = self.template.render(&build_context(&chunks), query);
        let response = self.llm.complete(&prompt).await.map_err(QueryError::Llm)?;

        Ok(Answer {
            response,
            sources: chunks.iter().map(Citation::from_chunk).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedIndex(Vec<RetrievedChunk>);

    #[async_trait]
    impl VectorSearch for FixedIndex {
        async fn search(&self, _query: &[f32], top_k: usize) -> anyhow::Result<Vec<RetrievedChunk>> {
            Ok(self.0.iter().take(top_k).cloned().collect())
        }
    }

    struct ConstEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ConstEmbedder {
        fn provider_name(&self) -> &str {
            "const"
        }
        fn model_name(&self) -> &str {
            "const"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl EmbeddingProvider for BrokenEmbedder {
        fn provider_name(&self) -> &str {
            "local"
        }
        fn model_name(&self) -> &str {
            "all-minilm-l6-v2"
        }
        fn dims(&self) -> usize {
            384
        }
        async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("model download failed")
        }
    }

    #[derive(Default)]
    struct RecordingLlm {
        calls: AtomicUsize,
        last_prompt: Mutex<String>,
        fail: bool,
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        fn model(&self) -> &str {
            "recording"
        }
        async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = prompt.to_string();
            if self.fail {
                anyhow::bail!("rate limited");
            }
            Ok("answer from llm".to_string())
        }
    }

    fn hit(text: &str, page: Option<&str>, score: f64) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: text.to_string(),
            file_name: "policy.pdf".to_string(),
            page_label: page.map(str::to_string),
            text: text.to_string(),
            score,
        }
    }

    fn engine(hits: Vec<RetrievedChunk>, cutoff: Option<f64>, llm: Arc<RecordingLlm>) -> QueryEngine {
        let retriever = Retriever::new(Arc::new(FixedIndex(hits)), Arc::new(ConstEmbedder))
            .with_top_k(2)
            .with_similarity_cutoff(cutoff);
        QueryEngine::new(retriever, llm)
    }

    #[test]
    fn snippet_truncates_on_characters() {
        assert_eq!(snippet("short"), "short");
        let exact = "a".repeat(SNIPPET_CHARS);
        assert_eq!(snippet(&exact), exact);

        let long = "é".repeat(SNIPPET_CHARS + 1);
        let s = snippet(&long);
        assert_eq!(s.chars().count(), SNIPPET_CHARS + ELLIPSIS.len());
        assert!(s.ends_with("..."));
    }

    #[test]
    fn citation_fields_follow_chunk() {
        let c = Citation::from_chunk(&hit("text", None, 0.876));
        assert_eq!(c.page, "N/A");
        assert_eq!(c.score, 0.88);
        assert_eq!(c.file, "policy.pdf");
        assert_eq!(round2(f64::NAN), 0.0);
    }

    #[tokio::test]
    async fn below_cutoff_returns_not_found_without_llm_call() {
        let llm = Arc::new(RecordingLlm::default());
        let e = engine(vec![hit("a", Some("1"), 0.41)], Some(0.5), llm.clone());
        let answer = e.answer("anything?").await.unwrap();
        assert_eq!(answer, Answer::not_found());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retained_chunks_fill_prompt_and_citations() {
        let llm = Arc::new(RecordingLlm::default());
        let hits = vec![
            hit("refunds take 30 days", Some("4"), 0.9),
            hit("shipping is free", Some("2"), 0.45),
            hit("never reached", Some("9"), 0.44),
        ];
        let e = engine(hits, Some(0.5), llm.clone());
        let answer = e.answer("refund policy?  ").await.unwrap();

        assert_eq!(answer.response, "answer from llm");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].page, "4");
        let prompt = llm.last_prompt.lock().unwrap().clone();
        assert!(prompt.contains("refunds take 30 days"));
        assert!(prompt.contains("Question: refund policy?  \n"));
        assert!(!prompt.contains("shipping is free"));
    }

    #[tokio::test]
    async fn without_cutoff_citations_match_top_k() {
        let llm = Arc::new(RecordingLlm::default());
        let hits = vec![
            hit("one", Some("1"), 0.1),
            hit("two", Some("2"), 0.05),
            hit("three", Some("3"), 0.01),
        ];
        let answer = engine(hits, None, llm).answer("q").await.unwrap();
        assert_eq!(answer.sources.len(), 2);
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let llm = Arc::new(RecordingLlm::default());
        let err = engine(vec![], None, llm).answer("   ").await.unwrap_err();
        assert!(matches!(err, QueryError::EmptyQuery));
    }

    #[tokio::test]
    async fn llm_failure_is_a_query_error() {
        let llm = Arc::new(RecordingLlm {
            fail: true,
            ..RecordingLlm::default()
        });
        let err = engine(vec![hit("a", Some("1"), 0.9)], None, llm)
            .answer("q")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "llm_error");
        assert!(err.to_string().contains("rate limited"));
    }

    async fn storage_with_index(meta_for: Option<&dyn EmbeddingProvider>) -> (tempfile::TempDir, Config) {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.dir = tmp.path().join("storage");
        let index = SqliteIndex::create(&config.storage.dir).await.unwrap();
        if let Some(embedder) = meta_for {
            index
                .write_meta(&index::IndexMeta::new(embedder, &config.chunking))
                .await
                .unwrap();
        }
        index.close().await;
        (tmp, config)
    }

    #[tokio::test]
    async fn unusable_embedder_fails_at_startup() {
        let (_tmp, config) = storage_with_index(Some(&BrokenEmbedder as &dyn EmbeddingProvider)).await;
        let err = Retriever::open_with(&config, Arc::new(BrokenEmbedder))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StartupError::EmbedderUnavailable(_)));
        assert!(err.to_string().contains("model download failed"));
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn index_without_meta_asks_for_reingest() {
        let (_tmp, config) = storage_with_index(None).await;
        let err = Retriever::open_with(&config, Arc::new(ConstEmbedder))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StartupError::Index(_)));
        assert!(err.to_string().contains("index is incomplete; re-run `ragchat ingest`"));
    }

    #[tokio::test]
    async fn missing_index_is_a_startup_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.dir = tmp.path().join("storage");
        let err = Retriever::from_config(&config).await.err().unwrap();
        assert!(matches!(err, StartupError::IndexMissing { .. }));
    }
}
