//! # repochat CLI
//!
//! ## Usage
//!
//! ```bash
//! repochat --config ./config/repochat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `repochat id <url>` | Print the repository identifier for a URL |
//! | `repochat ingest <url>` | Clone (or use `--path`) and index a repository |
//! | `repochat ask <repo_id> "<question>"` | Answer a question about an indexed repository |
//! | `repochat tree <repo_id>` | Print a checkout's file tree as JSON |
//! | `repochat serve` | Start the HTTP API |
//!
//! Logs go to stderr; set `RUST_LOG` (e.g. `RUST_LOG=repochat=debug`) to
//! change verbosity.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use repochat::config::{load_config, Config};
use repochat::materialize::{checkout_dir, file_tree};
use repochat::models::ConversationTurn;
use repochat::pipeline::RepoChat;
use repochat::repo_id::RepoId;
use repochat::server;

const DEFAULT_CONFIG: &str = "./config/repochat.toml";

/// Chat with a GitHub repository using retrieval-augmented generation.
#[derive(Parser)]
#[command(name = "repochat", version)]
struct Cli {
    /// Path to configuration file (TOML). A missing default file means
    /// built-in defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the repository identifier derived from a URL.
    Id { url: String },

    /// Index a repository, replacing any previous index for it.
    Ingest {
        /// GitHub URL (`https://github.com/{owner}/{repo}`).
        url: String,
        /// Index this local directory instead of cloning.
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Ask a question about an indexed repository.
    Ask {
        /// Identifier printed by `repochat id` / `repochat ingest`.
        repo_id: String,
        question: String,
        /// JSON file holding prior turns as `[["question", "answer"], ...]`.
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Print a cloned repository's file tree as JSON.
    Tree { repo_id: String },

    /// Start the HTTP API.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("repochat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Id { url } = &cli.command {
        println!("{}", RepoId::from_url(url)?);
        return Ok(());
    }

    let cfg = read_config(&cli.config)?;

    match cli.command {
        Commands::Id { .. } => {}
        Commands::Ingest { url, path } => {
            let chat = RepoChat::from_config(cfg)?;
            let (id, outcome) = match path {
                Some(path) => {
                    let id = RepoId::from_url(&url)?;
                    let outcome = chat.ingest(&path, &id).await;
                    (id, outcome)
                }
                None => {
                    let processed = chat.process_repository(&url).await?;
                    (processed.id, processed.outcome)
                }
            };
            chat.store().close(&id).await?;
            if !outcome.success {
                bail!(outcome.message);
            }
            println!("{}", outcome.message);
            println!("repo_id: {}", id);
        }
        Commands::Ask {
            repo_id,
            question,
            history,
        } => {
            let chat = RepoChat::from_config(cfg)?;
            let id = RepoId::parse(&repo_id)?;
            let history = match history {
                Some(path) => read_history(&path)?,
                None => Vec::new(),
            };
            let answer = chat.ask(&id, &question, &history).await;
            chat.store().close(&id).await?;
            println!("{}", answer?);
        }
        Commands::Tree { repo_id } => {
            let id = RepoId::parse(&repo_id)?;
            let root = checkout_dir(&cfg.repos, &id);
            if !root.is_dir() {
                bail!("No checkout for '{}' at {}", id, root.display());
            }
            println!("{}", serde_json::to_string_pretty(&file_tree(&root))?);
        }
        Commands::Serve => {
            let chat = Arc::new(RepoChat::from_config(cfg)?);
            server::run_server(chat).await?;
        }
    }

    Ok(())
}

fn read_config(path: &Path) -> Result<Config> {
    if path == Path::new(DEFAULT_CONFIG) && !path.exists() {
        tracing::info!("no config at {}; using defaults", path.display());
        let cfg = Config::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    load_config(path)
}

fn read_history(path: &Path) -> Result<Vec<ConversationTurn>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file: {}", path.display()))?;
    let pairs: Vec<(String, String)> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid history file: {}", path.display()))?;
    Ok(pairs.into_iter().map(ConversationTurn::from).collect())
}
