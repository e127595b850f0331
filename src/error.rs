//! Boundary error types.
//!
//! Internals use `anyhow`; each public entry point (ingestion, engine
//! startup, a single query) returns one of the enums below so callers can
//! tell configuration problems from per-request failures.

use std::path::PathBuf;
use thiserror::Error;

/// Message returned for every query while the engine is not ready.
pub const NOT_INITIALIZED_MESSAGE: &str = "System not initialized. Check server logs.";

/// Coarse classification shared by all boundary errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing API key, missing index, bad config. Fatal at startup.
    Configuration,
    /// Missing or unreadable source documents, embedding or storage failure during ingest.
    Ingestion,
    /// A single request failed; the service keeps running.
    Query,
}

/// Failure to build a ready query engine.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{var} is not set; export it or add it to a .env file")]
    MissingApiKey { var: String },

    #[error("index not found at {}; run `ragchat ingest` first", .path.display())]
    IndexMissing { path: PathBuf },

    #[error(
        "index was built with embedder {indexed} but {configured} is configured; re-run `ragchat ingest`"
    )]
    EmbeddingMismatch { indexed: String, configured: String },

    #[error("embedding model is not usable: {0:#}")]
    EmbedderUnavailable(anyhow::Error),

    #[error("invalid configuration: {0:#}")]
    InvalidConfig(anyhow::Error),

    #[error("failed to load index: {0:#}")]
    Index(anyhow::Error),
}

impl StartupError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

/// Failure of an ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no data: source directory {} does not exist", .path.display())]
    SourceMissing { path: PathBuf },

    #[error("no data: no readable documents found in {}", .path.display())]
    NoDocuments { path: PathBuf },

    #[error("invalid configuration: {0:#}")]
    InvalidConfig(anyhow::Error),

    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("failed to write index: {0:#}")]
    Storage(anyhow::Error),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::InvalidConfig(_) => ErrorKind::Configuration,
            _ => ErrorKind::Ingestion,
        }
    }
}

/// Failure of a single query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{}", NOT_INITIALIZED_MESSAGE)]
    NotReady,

    #[error("query must not be empty")]
    EmptyQuery,

    #[error("retrieval failed: {0:#}")]
    Retrieval(anyhow::Error),

    #[error("LLM call failed: {0:#}")]
    Llm(anyhow::Error),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Query
    }

    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::NotReady => "not_initialized",
            QueryError::EmptyQuery => "bad_request",
            QueryError::Retrieval(_) => "retrieval_error",
            QueryError::Llm(_) => "llm_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_uses_fixed_message() {
        assert_eq!(QueryError::NotReady.to_string(), NOT_INITIALIZED_MESSAGE);
    }

    #[test]
    fn kinds_follow_the_boundary() {
        let startup = StartupError::MissingApiKey {
            var: "GROQ_API_KEY".to_string(),
        };
        assert_eq!(startup.kind(), ErrorKind::Configuration);
        assert_eq!(QueryError::EmptyQuery.kind(), ErrorKind::Query);
        assert_eq!(QueryError::Llm(anyhow::anyhow!("x")).kind(), ErrorKind::Query);
        assert_eq!(
            IngestError::InvalidConfig(anyhow::anyhow!("bad glob")).kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn messages_name_the_fix() {
        let err = StartupError::IndexMissing {
            path: PathBuf::from("storage/index.sqlite"),
        };
        assert!(err.to_string().contains("run `ragchat ingest` first"));

        let err = IngestError::NoDocuments {
            path: PathBuf::from("data"),
        };
        assert!(err.to_string().starts_with("no data"));
        assert_eq!(err.kind(), ErrorKind::Ingestion);
    }

    #[test]
    fn wrapped_errors_keep_their_context() {
        let inner = anyhow::anyhow!("connection refused").context("calling groq");
        let err = QueryError::Llm(inner);
        assert_eq!(err.to_string(), "LLM call failed: calling groq: connection refused");
        assert_eq!(err.code(), "llm_error");
    }
}
