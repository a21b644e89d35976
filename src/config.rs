//! Configuration parsing and validation.
//!
//! kb-harness is configured by a single TOML file (default
//! `./config/kbh.toml`). Every section except `[db]` is optional and falls
//! back to the defaults below.
//!
//! ```toml
//! [db]
//! path = "./data/kbh.sqlite"
//!
//! [collection]
//! name = "team_knowledge"
//!
//! [chunking]
//! max_size = 1000
//! overlap = 200
//!
//! [embedding]
//! provider = "ollama"          # disabled | openai | ollama | hash | local
//! model = "nomic-embed-text"
//! dims = 768
//!
//! [llm]
//! provider = "ollama"          # disabled | ollama | openai
//! model = "llama3"
//! temperature = 0.7
//!
//! [retrieval]
//! top_k = 2
//!
//! [benchmark]
//! output_dir = "./data"
//! quick_cases = 8
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use kb_harness_core::chunk::{DEFAULT_MAX_SIZE, DEFAULT_OVERLAP};
use kb_harness_core::pipeline::DEFAULT_TOP_K;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectionConfig {
    #[serde(default = "default_collection_name")]
    pub name: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            name: default_collection_name(),
        }
    }
}

fn default_collection_name() -> String {
    "team_knowledge".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_max_size() -> usize {
    DEFAULT_MAX_SIZE
}
fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for Ollama (default `http://localhost:11434`) or an
    /// OpenAI-compatible server (default `https://api.openai.com`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum cached embeddings; 0 keeps every entry.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
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
fn default_cache_capacity() -> usize {
    10_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_temperature() -> f32 {
    0.7
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_baseline_preview_chars")]
    pub baseline_preview_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            baseline_preview_chars: default_baseline_preview_chars(),
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}
fn default_baseline_preview_chars() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct BenchmarkConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_quick_cases")]
    pub quick_cases: usize,
    /// HTTP endpoint of an external answering service to evaluate instead
    /// of the built-in pipeline.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            quick_cases: default_quick_cases(),
            endpoint: None,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_quick_cases() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    /// Defaults for commands that run without a config file.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/kbh.sqlite"),
            },
            collection: CollectionConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            benchmark: BenchmarkConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.collection.name.trim().is_empty() {
        anyhow::bail!("collection.name must be non-empty");
    }

    // Validate chunking
    if config.chunking.max_size == 0 {
        anyhow::bail!("chunking.max_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.max_size {
        anyhow::bail!("chunking.overlap must be < chunking.max_size");
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "hash" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, hash, or local.",
            other
        ),
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    // Validate llm
    match config.llm.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }
    if config.llm.is_enabled() && config.llm.model.is_none() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    // Validate benchmark
    if config.benchmark.quick_cases == 0 {
        anyhow::bail!("benchmark.quick_cases must be >= 1");
    }

    Ok(())
}
