//! # ragchat
//!
//! Ask questions about a folder of documents. `ragchat ingest` splits PDFs
//! (and text, Markdown, DOCX, PPTX) into page-tagged chunks, embeds them and
//! stores them in a local SQLite index. `ragchat serve` answers `POST /chat`
//! by retrieving the closest chunks, asking an LLM to answer from them only,
//! and citing the file and page of each chunk it used.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────┐
//! │  data/   │──▶│ Extract+Chunk │──▶│   SQLite    │
//! │ PDF/DOCX │   │    +Embed     │   │ index.sqlite│
//! └──────────┘   └──────────────┘   └─────┬──────┘
//!                                         │ top-k, cutoff
//!                                         ▼
//!                 ┌──────────┐      ┌────────────┐      ┌──────┐
//!                 │ CLI chat │◀────▶│ QueryEngine │─────▶│ LLM  │
//!                 │ web page │ HTTP └────────────┘      └──────┘
//!                 └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GROQ_API_KEY=...
//! ragchat ingest                # ./data → ./storage/index.sqlite
//! ragchat serve                 # http://127.0.0.1:8000
//! ragchat chat                  # console session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Boundary error types |
//! | [`models`] | Documents, pages, chunks |
//! | [`extract`] | Per-page text extraction |
//! | [`loader`] | Data directory walking |
//! | [`chunk`] | Text chunking with overlap |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Persisted vector index |
//! | [`ingest`] | Ingestion pipeline |
//! | [`prompt`] | QA prompt template |
//! | [`llm`] | Chat-completions client |
//! | [`query`] | Retrieval, guardrail, citations |
//! | [`server`] | HTTP server |
//! | [`chat`] | Console client |
//! | [`search`] | Retrieval-only CLI |
//! | [`stats`] | Index statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Index schema |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod query;
pub mod search;
pub mod server;
pub mod stats;
