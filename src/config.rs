//! TOML configuration.
//!
//! Every section is optional; missing values fall back to the defaults
//! below, which match the reference deployment (800/100 character chunks,
//! 50 document and 150 chunk caps, 4 retrieved chunks, local MiniLM
//! embeddings, Gemini answers).
//!
//! ```toml
//! [index]
//! dir = "./data/index"
//!
//! [chunking]
//! chunk_size = 800
//! chunk_overlap = 100
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::loader::build_globset;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub loader: LoaderConfig,
    pub chunking: ChunkingConfig,
    pub ingest: IngestConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub repos: ReposConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    /// Root directory; each repository gets `{dir}/{repo_id}/`.
    pub dir: PathBuf,
    pub backend: IndexBackend,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/index"),
            backend: IndexBackend::Sqlite,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directory names pruned anywhere in the tree.
    pub ignore_dirs: Vec<String>,
    /// Glob patterns matched against the relative path of each file.
    pub exclude_globs: Vec<String>,
    /// Entries whose name starts with this prefix are skipped.
    pub hidden_prefix: String,
    pub follow_symlinks: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            ignore_dirs: ["node_modules", "__pycache__", "venv", "env"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude_globs: Vec::new(),
            hidden_prefix: ".".to_string(),
            follow_symlinks: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters carried over from the end of one chunk into the next.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub max_documents: usize,
    pub max_chunks: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_documents: 50,
            max_chunks: 150,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Upper bound on one `ask` call, embedding through generation.
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `local`, `openai`, `ollama`, or `hash`.
    pub provider: String,
    pub model: String,
    pub dims: usize,
    /// Base URL override (Ollama, OpenAI-compatible servers).
    pub url: Option<String>,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: "all-minilm-l6-v2".to_string(),
            dims: 384,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    /// `gemini`, `openai`, or `disabled`.
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub url: Option<String>,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.0,
            url: None,
            max_retries: 3,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReposConfig {
    pub clone_dir: PathBuf,
    pub clone_timeout_secs: u64,
    pub shallow: bool,
}

impl Default for ReposConfig {
    fn default() -> Self {
        Self {
            clone_dir: PathBuf::from("./data/repos"),
            clone_timeout_secs: 300,
            shallow: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Allowed CORS origin. `FRONTEND_URL` overrides it at startup.
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            cors_origin: "http://localhost:5173".to_string(),
        }
    }
}

const EMBEDDING_PROVIDERS: &[&str] = &["local", "openai", "ollama", "hash"];
const GENERATION_PROVIDERS: &[&str] = &["gemini", "openai", "disabled"];

impl Config {
    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if self.ingest.max_documents == 0 {
            bail!("ingest.max_documents must be > 0");
        }
        if self.ingest.max_chunks == 0 {
            bail!("ingest.max_chunks must be > 0");
        }
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be > 0");
        }
        if self.embedding.dims == 0 {
            bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if !EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            bail!(
                "Unknown embedding provider: '{}'. Must be one of: {}.",
                self.embedding.provider,
                EMBEDDING_PROVIDERS.join(", ")
            );
        }
        if !GENERATION_PROVIDERS.contains(&self.generation.provider.as_str()) {
            bail!(
                "Unknown generation provider: '{}'. Must be one of: {}.",
                self.generation.provider,
                GENERATION_PROVIDERS.join(", ")
            );
        }
        build_globset(&self.loader.exclude_globs).context("Invalid loader.exclude_globs")?;
        Ok(())
    }
}

/// Read and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert_eq!(config.ingest.max_documents, 50);
        assert_eq!(config.ingest.max_chunks, 150);
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.index.backend, IndexBackend::Sqlite);
        assert!(config.loader.ignore_dirs.contains(&"node_modules".to_string()));
    }

    #[test]
    fn test_partial_section() {
        let config = parse_config(
            r#"
            [ingest]
            max_documents = 10

            [embedding]
            provider = "hash"
            dims = 64

            [index]
            backend = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.ingest.max_documents, 10);
        assert_eq!(config.ingest.max_chunks, 150);
        assert_eq!(config.embedding.dims, 64);
        assert_eq!(config.index.backend, IndexBackend::Memory);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let err = parse_config("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert!(parse_config("[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[generation]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn test_zero_caps_rejected() {
        assert!(parse_config("[ingest]\nmax_chunks = 0\n").is_err());
        assert!(parse_config("[retrieval]\ntop_k = 0\n").is_err());
    }

    #[test]
    fn test_bad_exclude_glob_rejected() {
        let err = parse_config("[loader]\nexclude_globs = [\"src/[a\"]\n").unwrap_err();
        assert!(format!("{:#}", err).contains("exclude_globs"));
    }
}
