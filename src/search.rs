//! `ragchat search`: retrieval only, no LLM call.
//!
//! Useful for checking what the index returns for a question and how the
//! similarity cutoff would treat it.

use anyhow::Result;

use crate::config::Config;
use crate::index::RetrievedChunk;
use crate::query::{snippet, Retriever, NO_PAGE};

pub async fn run_search(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        anyhow::bail!("query must not be empty");
    }

    // Show everything the index returns; the cutoff is reported per row.
    let retriever = Retriever::from_config(config)
        .await?
        .with_top_k(top_k.unwrap_or(config.retrieval.top_k))
        .with_similarity_cutoff(None);
    let results = retriever.retrieve(query).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, r) in results.iter().enumerate() {
        println!("{}", format_result(i + 1, r, config.retrieval.similarity_cutoff));
    }
    Ok(())
}

fn format_result(rank: usize, r: &RetrievedChunk, cutoff: Option<f64>) -> String {
    let below = match cutoff {
        Some(c) if r.score < c => "  [below cutoff]",
        _ => "",
    };
    format!(
        "{}. [{:.2}] {} (page {}){}\n    {}",
        rank,
        r.score,
        r.file_name,
        r.page_label.as_deref().unwrap_or(NO_PAGE),
        below,
        snippet(&r.text).replace('\n', " ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(score: f64, page: Option<&str>) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: "c1".to_string(),
            file_name: "policy.pdf".to_string(),
            page_label: page.map(str::to_string),
            text: "Refunds are processed\nwithin 30 days.".to_string(),
            score,
        }
    }

    #[test]
    fn test_format_marks_rows_below_cutoff() {
        let line = format_result(1, &result(0.42, Some("4")), Some(0.5));
        assert!(line.starts_with("1. [0.42] policy.pdf (page 4)  [below cutoff]"));
        assert!(line.contains("Refunds are processed within 30 days."));

        let line = format_result(2, &result(0.9, None), Some(0.5));
        assert!(line.starts_with("2. [0.90] policy.pdf (page N/A)\n"));
    }
}
