use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::provider::{Backend, Provider};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks of one page.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    3000
}
fn default_chunk_overlap() -> usize {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Chunks retrieved per question.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Chunks retrieved for the executive snapshot.
    #[serde(default = "default_summary_k")]
    pub summary_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            summary_k: default_summary_k(),
        }
    }
}

fn default_k() -> usize {
    3
}
fn default_summary_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: Provider,
    /// Defaults to the provider's first catalog model.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl LlmConfig {
    pub fn model_name(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }
}

fn default_provider() -> Provider {
    Provider::Groq
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_backend")]
    pub backend: Backend,
    /// Root for persistent corpora; one subdirectory per provider.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_backend() -> Backend {
    Backend::Ephemeral
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Config {
    /// Check the invariants every later stage relies on.
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
        if self.retrieval.k == 0 {
            bail!("retrieval.k must be >= 1");
        }
        if self.retrieval.summary_k == 0 {
            bail!("retrieval.summary_k must be >= 1");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be >= 1");
        }
        self.llm
            .provider
            .validate_model(&self.llm.model_name())
            .map_err(anyhow::Error::from)?;
        Ok(())
    }
}

/// Load and validate a TOML config file.
///
/// A missing file is not an error: every field has a default.
pub fn load_config(path: &Path) -> Result<Config> {
    let config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    config.validate()?;
    Ok(config)
}
