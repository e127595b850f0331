//! Document loader.
//!
//! Walks the data directory, keeps files matching the include globs (and not
//! the exclude globs), and extracts per-page text from each. Files that
//! cannot be read or yield no text are reported in
//! [`LoadedDocuments::skipped`] and logged; they never abort the run.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::extract::{content_type_for, extract_pages};
use crate::models::Document;

/// Always excluded, in addition to `ingest.exclude_globs`.
const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/.*", "**/~$*"];

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadedDocuments {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedFile>,
}

impl LoadedDocuments {
    pub fn page_count(&self) -> usize {
        self.documents.iter().map(|d| d.pages.len()).sum()
    }
}

/// Load every readable document under `config.data_dir`, sorted by relative path.
pub fn load_documents(config: &IngestConfig) -> Result<LoadedDocuments, IngestError> {
    let root = &config.data_dir;
    if !root.is_dir() {
        return Err(IngestError::SourceMissing { path: root.clone() });
    }

    let include_set = build_globset(config.include_globs.iter().map(String::as_str))?;
    let exclude_set = build_globset(
        DEFAULT_EXCLUDES
            .iter()
            .copied()
            .chain(config.exclude_globs.iter().map(String::as_str)),
    )?;

    let mut candidates = Vec::new();
    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        candidates.push((rel_str, path.to_path_buf()));
    }
    candidates.sort_by(|a, b| a.0.cmp(&b.0));

    let mut loaded = LoadedDocuments::default();
    for (rel_str, path) in candidates {
        match load_one(&path, &rel_str) {
            Ok(doc) => {
                tracing::debug!("loaded {} ({} pages)", rel_str, doc.pages.len());
                loaded.documents.push(doc);
            }
            Err(reason) => {
                tracing::warn!("skipping {}: {}", path.display(), reason);
                loaded.skipped.push(SkippedFile { path, reason });
            }
        }
    }

    if loaded.documents.is_empty() {
        return Err(IngestError::NoDocuments { path: root.clone() });
    }
    Ok(loaded)
}

fn load_one(path: &Path, relative_path: &str) -> Result<Document, String> {
    let content_type =
        content_type_for(path).ok_or_else(|| "unsupported file extension".to_string())?;
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    let pages = extract_pages(&bytes, content_type).map_err(|e| e.to_string())?;

    let doc = Document {
        id: Uuid::new_v4().to_string(),
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| relative_path.to_string()),
        relative_path: relative_path.to_string(),
        content_type: content_type.to_string(),
        modified_at: modified_secs(path),
        pages,
    };
    if doc.text_len() == 0 {
        return Err("no extractable text".to_string());
    }
    Ok(doc)
}

fn modified_secs(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn build_globset<'a>(patterns: impl Iterator<Item = &'a str>) -> Result<GlobSet, IngestError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| IngestError::InvalidConfig(e.into()))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| IngestError::InvalidConfig(e.into()))
}
