//! Index statistics.
//!
//! `ragchat status` prints what the index holds and how it was built, so a
//! user can confirm ingestion worked before starting the server.

use anyhow::Result;

use crate::config::Config;
use crate::embedding;
use crate::index::SqliteIndex;

/// Run the status command: open the index read-only and print a summary.
pub async fn run_status(config: &Config) -> Result<()> {
    let path = config.storage.index_path();
    if !path.is_file() {
        println!("ragchat status");
        println!("  index: {} (missing)", path.display());
        println!("  run `ragchat ingest` to build it");
        return Ok(());
    }

    let index = SqliteIndex::open(&config.storage.dir).await?;
    let stats = index.stats().await?;
    let files = index.file_breakdown().await?;
    let meta = index.meta().await.ok();
    let db_size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

    println!("ragchat status");
    println!("  index:       {}", path.display());
    println!("  size:        {}", format_bytes(db_size));
    println!("  documents:   {}", stats.documents);
    println!("  pages:       {}", stats.pages);
    println!("  chunks:      {}", stats.chunks);
    println!("  vectors:     {}", stats.vectors);

    match &meta {
        Some(meta) => {
            println!("  embedding:   {}", meta.embedder_signature());
            println!(
                "  chunking:    {} tokens, {} overlap",
                meta.max_tokens, meta.overlap_tokens
            );
            println!(
                "  built:       {} (ragchat {})",
                format_built_at(&meta.built_at),
                meta.version
            );
        }
        None => println!("  metadata:    missing (ingest did not finish; re-run `ragchat ingest`)"),
    }

    // Skipped when the embedder cannot be built, e.g. a missing API key.
    if let (Some(meta), Ok(embedder)) = (&meta, embedding::create_provider(&config.embedding)) {
        let configured = embedding::signature(embedder.as_ref());
        if configured != meta.embedder_signature() {
            println!(
                "  warning:     configured embedder is {}; re-run `ragchat ingest`",
                configured
            );
        }
    }

    if !files.is_empty() {
        println!();
        println!("  {:<48} {:>6} {:>8}", "FILE", "PAGES", "CHUNKS");
        println!("  {}", "-".repeat(64));
        for f in &files {
            println!(
                "  {:<48} {:>6} {:>8}",
                f.relative_path, f.page_count, f.chunk_count
            );
        }
    }
    println!();

    index.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_built_at(rfc3339: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(rfc3339)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| rfc3339.to_string())
}
