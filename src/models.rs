//! Core data models.
//!
//! Documents and chunks are produced by ingestion and never change after the
//! index is written; the serving side only reads them back as
//! [`RetrievedChunk`](crate::index::RetrievedChunk)s.

/// One page of extracted text. `label` is the 1-based page (or slide) number
/// for paginated formats and `None` for formats without pages.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub label: Option<String>,
    pub text: String,
}

impl Page {
    pub fn numbered(number: usize, text: impl Into<String>) -> Self {
        Self {
            label: Some(number.to_string()),
            text: text.into(),
        }
    }

    pub fn unlabeled(text: impl Into<String>) -> Self {
        Self {
            label: None,
            text: text.into(),
        }
    }
}

/// A source file loaded from the data directory.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    /// Bare file name, used in citations.
    pub file_name: String,
    /// Path relative to the data directory.
    pub relative_path: String,
    pub content_type: String,
    pub modified_at: i64,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn text_len(&self) -> usize {
        self.pages.iter().map(|p| p.text.trim().len()).sum()
    }
}

/// A bounded span of one page of a document.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
    pub file_name: String,
    pub page_label: Option<String>,
}
