//! Paragraph-boundary text chunker.
//!
//! Splits each page of a [`Document`] into [`Chunk`]s bounded by
//! `max_tokens`. Splitting prefers paragraph boundaries (`\n\n`), falling back
//! to the last newline or space for oversized paragraphs. Each chunk after
//! the first on a page starts with up to `overlap_tokens` of trailing text
//! from the chunk before it, snapped to a word boundary. Chunks never span
//! pages, so every chunk has exactly one page label.
//!
//! Lengths are measured in characters, never bytes.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, Document, Page};

/// Approximate chars-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Chunk every page of a document. Indices are contiguous from 0 across the
/// whole document; empty pages contribute nothing.
pub fn chunk_document(doc: &Document, max_tokens: usize, overlap_tokens: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for page in &doc.pages {
        let next_index = chunks.len() as i64;
        chunks.extend(chunk_page(doc, page, next_index, max_tokens, overlap_tokens));
    }
    chunks
}

/// Chunk a single page, numbering chunks from `start_index`.
pub fn chunk_page(
    doc: &Document,
    page: &Page,
    start_index: i64,
    max_tokens: usize,
    overlap_tokens: usize,
) -> Vec<Chunk> {
    split_text(
        &page.text,
        max_tokens * CHARS_PER_TOKEN,
        overlap_tokens * CHARS_PER_TOKEN,
    )
    .into_iter()
    .enumerate()
    .map(|(i, text)| Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: doc.id.clone(),
        chunk_index: start_index + i as i64,
        hash: sha256_hex(&text),
        text,
        file_name: doc.file_name.clone(),
        page_label: page.label.clone(),
    })
    .collect()
}

/// Split text into pieces of at most `max_chars` characters, each piece after
/// the first prefixed with overlap from its predecessor.
pub fn split_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let overlap_chars = overlap_chars.min(max_chars.saturating_sub(1));
    // Leave room for the overlap prefix.
    let body_max = (max_chars - overlap_chars).max(1);

    let mut pieces: Vec<String> = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }
        let para_len = char_len(trimmed);

        let would_be = if current_buf.is_empty() {
            para_len
        } else {
            char_len(&current_buf) + 2 + para_len
        };
        if would_be > body_max && !current_buf.is_empty() {
            pieces.push(std::mem::take(&mut current_buf));
        }

        if para_len > body_max {
            hard_split(trimmed, body_max, &mut pieces);
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }
    if !current_buf.is_empty() {
        pieces.push(current_buf);
    }

    if overlap_chars == 0 || pieces.len() < 2 {
        return pieces;
    }

    let mut out = Vec::with_capacity(pieces.len());
    out.push(pieces[0].clone());
    for pair in pieces.windows(2) {
        let (prev, piece) = (&pair[0], &pair[1]);
        let room = max_chars.saturating_sub(char_len(piece) + 1);
        let carried = tail_at_word(prev, overlap_chars.min(room));
        if carried.is_empty() {
            out.push(piece.clone());
        } else {
            out.push(format!("{} {}", carried, piece));
        }
    }
    out
}

/// Split an oversized paragraph at the last newline or space before the limit.
fn hard_split(text: &str, max_chars: usize, pieces: &mut Vec<String>) {
    let mut remaining = text;
    while !remaining.is_empty() {
        let limit = byte_offset(remaining, max_chars);
        let split_at = if limit < remaining.len() {
            remaining[..limit]
                .rfind(|c: char| c == '\n' || c == ' ')
                .filter(|&pos| pos > 0)
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
}

/// The last `n` characters of `text`, shortened so it does not start mid-word.
fn tail_at_word(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let len = char_len(text);
    if n >= len {
        return text.trim();
    }
    let start = byte_offset(text, len - n);
    let tail = &text[start..];
    let at_boundary = text[..start]
        .chars()
        .next_back()
        .map_or(true, char::is_whitespace);
    if at_boundary {
        tail.trim()
    } else {
        tail.find(char::is_whitespace)
            .map(|pos| tail[pos..].trim())
            .unwrap_or("")
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of the `n`th character, or the string length if shorter.
fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(pages: Vec<Page>) -> Document {
        Document {
            id: "doc1".to_string(),
            file_name: "policy.pdf".to_string(),
            relative_path: "policy.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            modified_at: 0,
            pages,
        }
    }

    #[test]
    fn test_small_text_single_piece() {
        let pieces = split_text("Hello, world!", 100, 20);
        assert_eq!(pieces, vec!["Hello, world!"]);
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(split_text("", 100, 20).is_empty());
        assert!(split_text("\n\n  \n\n", 100, 20).is_empty());
    }

    #[test]
    fn test_paragraphs_under_limit_are_merged() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let pieces = split_text(text, 400, 0);
        assert_eq!(pieces.len(), 1);
        assert!(pieces[0].contains("First paragraph."));
        assert!(pieces[0].contains("Third paragraph."));
    }

    #[test]
    fn test_pieces_respect_max_chars() {
        let text = (0..80)
            .map(|i| format!("Sentence number {} talks about refunds.", i))
            .collect::<Vec<_>>()
            .join(" ");
        for (max, overlap) in [(120, 0), (120, 40), (64, 16)] {
            let pieces = split_text(&text, max, overlap);
            assert!(pieces.len() > 1);
            for p in &pieces {
                assert!(char_len(p) <= max, "piece of {} chars exceeds {}", char_len(p), max);
            }
        }
    }

    #[test]
    fn test_overlap_carries_previous_tail() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let pieces = split_text(text, 40, 12);
        assert!(pieces.len() > 1);
        for pair in pieces.windows(2) {
            let next_first_word = pair[1].split_whitespace().next().unwrap();
            assert!(
                pair[0].contains(next_first_word),
                "{:?} should start with text from {:?}",
                pair[1],
                pair[0]
            );
        }
    }

    #[test]
    fn test_overlap_snaps_to_word_boundary() {
        assert_eq!(tail_at_word("hello wonderful world", 8), "world");
        assert_eq!(tail_at_word("hello world", 6), "world");
        assert_eq!(tail_at_word("hello", 3), "");
        assert_eq!(tail_at_word("hi there", 50), "hi there");
    }

    #[test]
    fn test_multibyte_text_is_split_on_char_boundaries() {
        let text = "é".repeat(500);
        let pieces = split_text(&text, 100, 0);
        assert_eq!(pieces.len(), 5);
        assert!(pieces.iter().all(|p| char_len(p) == 100));
    }

    #[test]
    fn test_chunks_never_cross_pages() {
        let d = doc(vec![
            Page::numbered(1, "Page one text."),
            Page::numbered(2, ""),
            Page::numbered(3, "Page three text."),
        ]);
        let chunks = chunk_document(&d, 256, 32);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page_label.as_deref(), Some("1"));
        assert_eq!(chunks[0].text, "Page one text.");
        assert_eq!(chunks[1].page_label.as_deref(), Some("3"));
        assert_eq!(chunks[1].text, "Page three text.");
        assert!(chunks.iter().all(|c| c.file_name == "policy.pdf"));
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let page_text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let d = doc(vec![
            Page::numbered(1, page_text.clone()),
            Page::numbered(2, page_text),
        ]);
        let chunks = chunk_document(&d, 10, 2);
        assert!(chunks.len() > 2);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_hash_is_deterministic() {
        let d = doc(vec![Page::unlabeled("Alpha\n\nBeta\n\nGamma\n\nDelta")]);
        let c1 = chunk_document(&d, 3, 0);
        let c2 = chunk_document(&d, 3, 0);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
            assert_eq!(a.chunk_index, b.chunk_index);
            assert!(a.page_label.is_none());
        }
    }
}
