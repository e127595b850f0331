//! # ragchat CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragchat ingest` | Build the index from the data directory |
//! | `ragchat serve` | Start the HTTP chat server |
//! | `ragchat chat` | Console chat, in-process or against a server |
//! | `ragchat search "<query>"` | Show retrieved chunks without calling the LLM |
//! | `ragchat status` | Show what the index contains |
//!
//! ## Examples
//!
//! ```bash
//! ragchat ingest --data-dir ./pdfs
//! ragchat serve --bind 0.0.0.0:8000
//! ragchat chat --url http://127.0.0.1:8000
//! RUST_LOG=ragchat=debug ragchat search "refund policy" --top-k 5
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ragchat::{chat, config, ingest, search, server, stats};

/// ragchat: question answering over your own documents, with page citations.
#[derive(Parser)]
#[command(name = "ragchat", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./ragchat.toml`; built-in defaults are used if that file
    /// does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from the data directory.
    ///
    /// Any existing index in the storage directory is replaced.
    Ingest {
        /// Directory holding the source documents (overrides `ingest.data_dir`).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Directory to write the index to (overrides `storage.dir`).
        #[arg(long)]
        storage_dir: Option<PathBuf>,

        /// Count documents, pages and chunks without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Start the HTTP server (`POST /chat`, `GET /health`, `GET /`).
    Serve {
        /// Address to bind (overrides `server.bind`).
        #[arg(long)]
        bind: Option<String>,
    },

    /// Interactive console chat.
    Chat {
        /// Talk to a running `ragchat serve` instead of loading the index here.
        #[arg(long)]
        url: Option<String>,

        /// Run ingestion before starting the session.
        #[arg(long)]
        ingest: bool,
    },

    /// Show the chunks retrieved for a query, without calling the LLM.
    Search {
        /// The question to retrieve for.
        query: String,

        /// Number of chunks to show (overrides `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Show index statistics and build settings.
    Status,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "ragchat=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut cfg = config::resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest {
            data_dir,
            storage_dir,
            dry_run,
        } => {
            if let Some(dir) = data_dir {
                cfg.ingest.data_dir = dir;
            }
            if let Some(dir) = storage_dir {
                cfg.storage.dir = dir;
            }
            ingest::run_ingest(&cfg, dry_run).await?;
        }
        Commands::Serve { bind } => {
            server::run_server(&cfg, bind.as_deref()).await?;
        }
        Commands::Chat { url, ingest } => {
            chat::run_chat(&cfg, url.as_deref(), ingest).await?;
        }
        Commands::Search { query, top_k } => {
            search::run_search(&cfg, &query, top_k).await?;
        }
        Commands::Status => {
            stats::run_status(&cfg).await?;
        }
    }

    Ok(())
}
