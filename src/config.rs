use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Where uploaded files and the registry document live.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Content-addressed store: files named `<sha256><ext>`.
    pub upload_dir: PathBuf,
    /// Human-readable copies named by the original filename.
    pub data_dir: PathBuf,
    /// JSON registry document path. Defaults to `<upload_dir>/registry.json`.
    #[serde(default)]
    pub registry_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn registry_path(&self) -> PathBuf {
        self.registry_path
            .clone()
            .unwrap_or_else(|| self.upload_dir.join("registry.json"))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1500
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_transcribe_model")]
    pub transcribe_model: String,
    /// Base URL for the OpenAI-compatible API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Refuse all provider calls (offline/test deployments).
    #[serde(default)]
    pub disabled: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            chat_model: default_chat_model(),
            embed_model: default_embed_model(),
            transcribe_model: default_transcribe_model(),
            api_base: default_api_base(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            disabled: false,
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_embed_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_transcribe_model() -> String {
    "whisper-1".to_string()
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    /// Language the model is instructed to answer in.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
        }
    }
}

fn default_language() -> String {
    "Japanese".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    /// Per-file size limit in megabytes.
    #[serde(default = "default_max_mb")]
    pub max_mb: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_mb: default_max_mb(),
        }
    }
}

fn default_max_mb() -> u64 {
    20
}

impl UploadConfig {
    pub fn max_bytes(&self) -> u64 {
        self.max_mb * 1024 * 1024
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.size == 0 {
        anyhow::bail!("chunking.size must be > 0");
    }

    if config.chunking.overlap >= config.chunking.size {
        anyhow::bail!(
            "chunking.overlap must be < chunking.size ({} >= {})",
            config.chunking.overlap,
            config.chunking.size
        );
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.provider.batch_size == 0 {
        anyhow::bail!("provider.batch_size must be >= 1");
    }

    if config.upload.max_mb == 0 {
        anyhow::bail!("upload.max_mb must be >= 1");
    }

    Ok(config)
}
