//! QA prompt template.
//!
//! A template is plain text with two slots, `{context}` and `{query}`. Slots
//! are filled in a single pass, so braces inside the retrieved text or the
//! user's question are never re-expanded.

use anyhow::{bail, Result};

use crate::index::RetrievedChunk;

/// Sentence the model is told to answer with when the context does not help.
pub const REFUSAL_SENTENCE: &str = "I cannot find the answer in the provided documents.";

const CONTEXT_SLOT: &str = "{context}";
const QUERY_SLOT: &str = "{query}";

/// Default QA template.
pub const DEFAULT_TEMPLATE: &str = "You are a helpful assistant answering questions about a set of documents.
Use ONLY the context below to answer. Do not use prior knowledge.
If the context does not contain the answer, reply exactly: \"I cannot find the answer in the provided documents.\"

Context:
---------------------
{context}
---------------------

Question: {query}
Answer: ";

#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    /// Build a template, rejecting text that lacks either slot.
    pub fn new(text: &str) -> Result<Self> {
        for slot in [CONTEXT_SLOT, QUERY_SLOT] {
            if !text.contains(slot) {
                bail!("prompt template must contain the {} placeholder", slot);
            }
        }
        Ok(Self {
            text: text.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn render(&self, context: &str, query: &str) -> String {
        let mut out = String::with_capacity(self.text.len() + context.len() + query.len());
        let mut rest = self.text.as_str();
        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix(CONTEXT_SLOT) {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUERY_SLOT) {
                out.push_str(query);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// Join retrieved chunk texts into the context block, separated by blank lines.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: "c".to_string(),
            file_name: "f.pdf".to_string(),
            page_label: Some("1".to_string()),
            text: text.to_string(),
            score: 0.5,
        }
    }

    #[test]
    fn default_template_mentions_refusal_sentence() {
        let t = PromptTemplate::default();
        assert!(t.as_str().contains(REFUSAL_SENTENCE));
        assert!(PromptTemplate::new(DEFAULT_TEMPLATE).is_ok());
    }

    #[test]
    fn rejects_missing_slots() {
        assert!(PromptTemplate::new("Q: {query}").is_err());
        assert!(PromptTemplate::new("C: {context}").is_err());
    }

    #[test]
    fn render_fills_both_slots() {
        let t = PromptTemplate::new("C={context};Q={query}").unwrap();
        assert_eq!(t.render("ctx", "why?"), "C=ctx;Q=why?");
    }

    #[test]
    fn render_does_not_expand_slots_inside_values() {
        let t = PromptTemplate::new("{context}|{query}").unwrap();
        let out = t.render("about {query} syntax", "what is {context}?");
        assert_eq!(out, "about {query} syntax|what is {context}?");
    }

    #[test]
    fn render_keeps_other_braces() {
        let t = PromptTemplate::new("{json} {context} {query} {").unwrap();
        assert_eq!(t.render("a", "b"), "{json} a b {");
    }

    #[test]
    fn context_joins_with_blank_lines() {
        let ctx = build_context(&[chunk(" first \n"), chunk("second")]);
        assert_eq!(ctx, "first\n\nsecond");
        assert_eq!(build_context(&[]), "");
    }
}
