//! TOML configuration.
//!
//! Every section is optional; missing sections and fields fall back to the
//! defaults below, which reproduce the stock setup: PDFs in `./data`, the
//! index in `./storage`, local `all-minilm-l6-v2` embeddings, and Groq's
//! `llama-3.3-70b-versatile` for answers.
//!
//! ```toml
//! [ingest]
//! data_dir = "data"
//!
//! [storage]
//! dir = "storage"
//!
//! [embedding]
//! provider = "local"
//!
//! [llm]
//! provider = "groq"
//! model = "llama-3.3-70b-versatile"
//!
//! [retrieval]
//! top_k = 2
//! similarity_cutoff = 0.3
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use anyhow::{bail, Context, Result};
use globset::Glob;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::prompt::PromptTemplate;

/// Config file picked up when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "ragchat.toml";

/// File name of the SQLite index inside the storage directory.
pub const INDEX_FILE: &str = "index.sqlite";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_include_globs() -> Vec<String> {
    ["**/*.pdf", "**/*.txt", "**/*.md", "**/*.docx", "**/*.pptx"]
        .iter()
        .map(|g| g.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("storage")
}

impl StorageConfig {
    /// Full path of the index database.
    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
        }
    }
}

fn default_max_tokens() -> usize {
    1024
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Overrides the provider's default OpenAI-compatible base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            base_url: None,
            api_key_env: None,
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_provider() -> String {
    "groq".to_string()
}
fn default_llm_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_llm_timeout() -> u64 {
    60
}

impl LlmConfig {
    /// Base URL of the chat-completions API for the configured provider.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.base_url {
            return url.trim_end_matches('/');
        }
        match self.provider.as_str() {
            "openai" => "https://api.openai.com/v1",
            "ollama" => "http://localhost:11434/v1",
            _ => "https://api.groq.com/openai/v1",
        }
    }

    /// Environment variable that must hold the API key, if the provider needs one.
    pub fn api_key_var(&self) -> Option<&str> {
        if let Some(var) = &self.api_key_env {
            return Some(var.as_str());
        }
        match self.provider.as_str() {
            "groq" => Some("GROQ_API_KEY"),
            "openai" => Some("OPENAI_API_KEY"),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Chunks scoring below this cosine similarity never reach the LLM.
    #[serde(default)]
    pub similarity_cutoff: Option<f64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_cutoff: None,
        }
    }
}

fn default_top_k() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PromptConfig {
    /// Custom QA template; must contain `{context}` and `{query}`.
    #[serde(default)]
    pub template: Option<String>,
}

impl PromptConfig {
    pub fn build(&self) -> Result<PromptTemplate> {
        match &self.template {
            Some(t) => PromptTemplate::new(t),
            None => Ok(PromptTemplate::default()),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load `path` when given; otherwise `./ragchat.toml` if it exists, else defaults.
pub fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                load_config(default_path)
            } else {
                tracing::debug!("no {} found, using built-in defaults", DEFAULT_CONFIG_PATH);
                Ok(Config::default())
            }
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        // Chunking
        if self.chunking.max_tokens == 0 {
            bail!("chunking.max_tokens must be > 0");
        }
        if self.chunking.overlap_tokens >= self.chunking.max_tokens {
            bail!("chunking.overlap_tokens must be smaller than chunking.max_tokens");
        }

        // Ingest globs
        for pattern in self
            .ingest
            .include_globs
            .iter()
            .chain(self.ingest.exclude_globs.iter())
        {
            Glob::new(pattern).with_context(|| format!("invalid glob pattern: '{}'", pattern))?;
        }

        // Embedding
        match self.embedding.provider.as_str() {
            "local" => {}
            "openai" | "ollama" => {
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be local, openai, or ollama.",
                other
            ),
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }

        // LLM
        match self.llm.provider.as_str() {
            "groq" | "openai" | "ollama" => {}
            other => bail!(
                "Unknown llm provider: '{}'. Must be groq, openai, or ollama.",
                other
            ),
        }
        if self.llm.model.trim().is_empty() {
            bail!("llm.model must not be empty");
        }

        // Retrieval
        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }
        if let Some(cutoff) = self.retrieval.similarity_cutoff {
            if !(-1.0..=1.0).contains(&cutoff) {
                bail!("retrieval.similarity_cutoff must be in [-1.0, 1.0]");
            }
        }

        self.prompt.build().context("invalid prompt.template")?;

        Ok(())
    }
}
