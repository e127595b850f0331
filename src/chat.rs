//! Console chat client.
//!
//! Reads questions line by line and prints answers with their sources. The
//! backend is either an in-process [`QueryEngine`] or a running `ragchat
//! serve` reached over HTTP.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::config::Config;
use crate::query::{Answer, QueryEngine};
use crate::server::ErrorBody;

/// Inputs that end the session (compared trimmed, case-insensitively).
const EXIT_COMMANDS: &[&str] = &["quit", "exit", "bye"];

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn ask(&self, query: &str) -> Result<Answer>;
}

#[async_trait]
impl ChatBackend for QueryEngine {
    async fn ask(&self, query: &str) -> Result<Answer> {
        Ok(self.answer(query).await?)
    }
}

/// HTTP client for `POST /chat`.
pub struct RemoteClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ChatBackend for RemoteClient {
    async fn ask(&self, query: &str) -> Result<Answer> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await
            .with_context(|| format!("could not reach {}", self.endpoint))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Answer>()
                .await
                .context("invalid response from server");
        }
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => bail!("server error {}: {}", status, body.detail),
            Err(_) => bail!("server error {}: {}", status, text),
        }
    }
}

pub fn is_exit_command(line: &str) -> bool {
    let line = line.trim();
    EXIT_COMMANDS.iter().any(|c| line.eq_ignore_ascii_case(c))
}

/// Format an answer and its numbered sources for the console.
pub fn render_answer(answer: &Answer) -> String {
    let mut out = format!("Bot: {}\n", answer.response.trim());
    if !answer.sources.is_empty() {
        out.push_str("Sources:\n");
        for (i, s) in answer.sources.iter().enumerate() {
            out.push_str(&format!(
                "  [{}] {} (page {}, score {:.2})\n",
                i + 1,
                s.file,
                s.page,
                s.score
            ));
            out.push_str(&format!("      \"{}\"\n", s.text.replace('\n', " ")));
        }
    }
    out
}

/// Prompt, read, answer until an exit command or end of input.
///
/// Per-question errors are printed and the loop continues.
pub async fn chat_loop<R, W>(backend: &dyn ChatBackend, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        write!(out, "You: ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };
        if is_exit_command(&line) {
            writeln!(out, "Goodbye!")?;
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        match backend.ask(line.trim()).await {
            Ok(answer) => writeln!(out, "{}", render_answer(&answer))?,
            Err(e) => writeln!(out, "Error: {:#}\n", e)?,
        }
    }
    Ok(())
}

/// `ragchat chat`: console session against a local engine or a remote server.
pub async fn run_chat(config: &Config, url: Option<&str>, ingest_first: bool) -> Result<()> {
    if ingest_first {
        crate::ingest::run_ingest(config, false).await?;
    }

    let backend: Box<dyn ChatBackend> = match url {
        Some(url) => {
            println!("Connected to {} (type 'quit' to exit)", url);
            Box::new(RemoteClient::new(url)?)
        }
        None => {
            let engine = QueryEngine::from_config(config).await?;
            println!("Chatbot ready! (type 'quit' to exit)");
            Box::new(engine)
        }
    };

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    chat_loop(backend.as_ref(), stdin, &mut stdout).await
}
