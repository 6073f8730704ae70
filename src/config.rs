use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/nbe.sqlite"),
        }
    }
}

/// Object store the documents are fetched from.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// `"s3"` or `"local"`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    /// S3 bucket name (required for the s3 backend).
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Root directory for the local backend.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            bucket: String::new(),
            region: default_region(),
            endpoint_url: None,
            root: default_storage_root(),
        }
    }
}

fn default_storage_backend() -> String {
    "local".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/files")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between neighbouring chunks in characters.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Top-K per document for chat answers.
    #[serde(default = "default_chat_top_k")]
    pub chat_top_k: usize,
    /// Top-K per document for MCQ/flashcard generation.
    #[serde(default = "default_artifact_top_k")]
    pub artifact_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chat_top_k: default_chat_top_k(),
            artifact_top_k: default_artifact_top_k(),
        }
    }
}

fn default_chat_top_k() -> usize {
    3
}
fn default_artifact_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"openai"` or `"disabled"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
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
pub struct GenerationConfig {
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_temperature")]
    pub chat_temperature: f32,
    /// Topics call favours determinism.
    #[serde(default = "default_topic_temperature")]
    pub topic_temperature: f32,
    /// Artifact call: low temperature since downstream validation is strict.
    #[serde(default = "default_artifact_temperature")]
    pub artifact_temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
            base_url: default_base_url(),
            chat_temperature: default_chat_temperature(),
            topic_temperature: default_topic_temperature(),
            artifact_temperature: default_artifact_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_chat_temperature() -> f32 {
    0.7
}
fn default_topic_temperature() -> f32 {
    0.3
}
fn default_artifact_temperature() -> f32 {
    0.5
}
fn default_max_tokens() -> usize {
    2048
}
fn default_generation_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// `"pinecone"` or `"memory"`.
    #[serde(default = "default_index_provider")]
    pub provider: String,
    /// Pinecone index host, e.g. `my-index-abc123.svc.us-east-1.pinecone.io`.
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: default_index_provider(),
            host: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_index_provider() -> String {
    "memory".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7431".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Overall wall-clock budget for one generation request.
    #[serde(default = "default_pipeline_timeout")]
    pub timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_pipeline_timeout(),
        }
    }
}

fn default_pipeline_timeout() -> u64 {
    60
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }

    if config.retrieval.chat_top_k == 0 || config.retrieval.artifact_top_k == 0 {
        anyhow::bail!("retrieval top_k values must be >= 1");
    }

    match config.storage.backend.as_str() {
        "local" => {}
        "s3" => {
            if config.storage.bucket.is_empty() {
                anyhow::bail!("storage.bucket must be set when storage.backend is 's3'");
            }
        }
        other => anyhow::bail!(
            "Unknown storage backend: '{}'. Must be local or s3.",
            other
        ),
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0 when embeddings are enabled");
    }

    match config.index.provider.as_str() {
        "memory" => {}
        "pinecone" => {
            if config.index.host.is_empty() {
                anyhow::bail!("index.host must be set when index.provider is 'pinecone'");
            }
        }
        other => anyhow::bail!(
            "Unknown index provider: '{}'. Must be memory or pinecone.",
            other
        ),
    }

    for (name, temp) in [
        ("chat_temperature", config.generation.chat_temperature),
        ("topic_temperature", config.generation.topic_temperature),
        ("artifact_temperature", config.generation.artifact_temperature),
    ] {
        if !(0.0..=2.0).contains(&temp) {
            anyhow::bail!("generation.{} must be in [0.0, 2.0]", name);
        }
    }

    if config.pipeline.timeout_secs == 0 {
        anyhow::bail!("pipeline.timeout_secs must be > 0");
    }

    Ok(())
}
