//! Shared fixtures: an offline embedder, a recording LLM and a PDF builder.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ragchat::embedding::EmbeddingProvider;
use ragchat::llm::LlmClient;

/// Hashes lowercase character trigrams into a fixed number of buckets and
/// L2-normalizes. Texts sharing words score high; unrelated texts score low.
pub struct TrigramEmbedder {
    pub dims: usize,
}

impl Default for TrigramEmbedder {
    fn default() -> Self {
        Self { dims: 256 }
    }
}

impl TrigramEmbedder {
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let chars: Vec<char> = text.to_lowercase().chars().collect();
        let mut v = vec![0.0f32; self.dims];
        for window in chars.windows(3) {
            let mut h: u64 = 0xcbf29ce484222325;
            for c in window {
                h ^= *c as u64;
                h = h.wrapping_mul(0x100000001b3);
            }
            v[(h % self.dims as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for TrigramEmbedder {
    fn provider_name(&self) -> &str {
        "fake"
    }
    fn model_name(&self) -> &str {
        "trigram"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Answers with the prompt it was given, so tests can see what reached the model.
#[derive(Default)]
pub struct EchoLlm {
    pub calls: AtomicUsize,
    pub last_prompt: Mutex<Option<String>>,
}

impl EchoLlm {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for EchoLlm {
    fn model(&self) -> &str {
        "echo"
    }
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        Ok(prompt.to_string())
    }
}

/// Fails the first `failures` calls with a rate-limit error, then answers.
pub struct FlakyLlm {
    pub failures: AtomicUsize,
}

impl FlakyLlm {
    pub fn failing(times: usize) -> Self {
        Self {
            failures: AtomicUsize::new(times),
        }
    }
}

#[async_trait]
impl LlmClient for FlakyLlm {
    fn model(&self) -> &str {
        "flaky"
    }
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            anyhow::bail!("429 upstream rate limited");
        }
        Ok("Refunds take 30 days.".to_string())
    }
}

/// Minimal valid PDF with one line of Helvetica text per page.
/// Builds body then xref with correct byte offsets so pdf-extract can parse it.
/// Page text must not contain parentheses or backslashes.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let n = pages.len();
    let mut offsets = Vec::new();
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");

    let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", 4 + 2 * i)).collect();
    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids.join(" "),
            n
        )
        .as_bytes(),
    );

    offsets.push(out.len());
    out.extend_from_slice(
        b"3 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );

    for (i, text) in pages.iter().enumerate() {
        let page_id = 4 + 2 * i;
        let content_id = page_id + 1;
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >> endobj\n",
                page_id, content_id
            )
            .as_bytes(),
        );
        let stream = format!("BT /F1 12 Tf 72 700 Td ({}) Tj ET", text);
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
                content_id,
                stream.len(),
                stream
            )
            .as_bytes(),
        );
    }

    let size = offsets.len() + 1;
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for off in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
    }
    out.extend_from_slice(
        format!("trailer << /Size {} /Root 1 0 R >>\nstartxref\n", size).as_bytes(),
    );
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// A PDF whose page points at a font object that does not exist. Same byte
/// length as a valid file, so the xref stays correct.
pub fn pdf_with_missing_font() -> Vec<u8> {
    let pdf = String::from_utf8(pdf_with_pages(&["Orphaned text."])).unwrap();
    pdf.replace("/F1 3 0 R", "/F1 9 0 R").into_bytes()
}

pub const REFUND_PHRASE: &str = "Refunds are processed within 30 days of the refund request.";

/// The four-page handbook used across tests; page 4 holds the refund policy.
pub fn policy_pdf() -> Vec<u8> {
    let refund_page = format!("Refund policy: {}", REFUND_PHRASE);
    pdf_with_pages(&[
        "Welcome to the Acme employee handbook.",
        "Shipping takes five business days for domestic orders.",
        "Office hours are nine to five on weekdays.",
        refund_page.as_str(),
    ])
}
