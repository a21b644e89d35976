//! Embedding provider implementations.
//!
//! Concrete [`Embedder`] backends selected by `[embedding] provider`:
//! - **[`DisabledEmbedder`]**: returns errors; used when embeddings are not configured.
//! - **[`OpenAIEmbedder`]**: calls the OpenAI embeddings API with batching, retry, and backoff.
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`HashEmbedder`]**: offline FNV-1a feature hashing; deterministic, no model needed.
//! - **`LocalEmbedder`**: runs models locally via fastembed (feature
//!   `local-embeddings-fastembed`); no network calls after model download.
//!
//! [`create_embedder`] wraps the chosen backend in a
//! [`CachedEmbedder`] so repeated texts are embedded once per process.
//! Retry behaviour for the remote providers is described in [`crate::http`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use kb_harness_core::embedding::{CachedEmbedder, Embedder, EmbeddingCache};
use kb_harness_core::error::{HarnessError, Result};

use crate::config::EmbeddingConfig;
use crate::http;

/// Dimensionality of the hash embedder when `embedding.dims` is unset.
pub const DEFAULT_HASH_DIMS: usize = 256;

// ============ Disabled Provider ============

/// An embedding provider that always returns errors.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(HarnessError::external(
            "Embedding provider is disabled; set [embedding] provider in the config",
        ))
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API (`POST /v1/embeddings`).
///
/// Requires the `OPENAI_API_KEY` environment variable. Texts are sent in
/// batches of `embedding.batch_size`.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            api_key,
            model,
            dims,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let endpoint = format!("{}/v1/embeddings", self.url.trim_end_matches('/'));
        let mut out = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = http::send_json_with_retry("OpenAI", self.max_retries, || {
                self.client
                    .post(&endpoint)
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .json(&body)
            })
            .await?;
            out.extend(parse_openai_response(&json)?);
        }

        Ok(out)
    }
}

/// Extract `data[].embedding` arrays, ordered by their `index` field.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| HarnessError::external("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .ok_or_else(|| HarnessError::external("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, to_vector(embedding, "OpenAI")?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default
/// `http://localhost:11434`). Requires an embedding model to be pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;

        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            model,
            dims,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let endpoint = format!("{}/api/embed", self.url.trim_end_matches('/'));
        let service = format!("Ollama at {}", self.url);
        let mut out = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = http::send_json_with_retry(&service, self.max_retries, || {
                self.client.post(&endpoint).json(&body)
            })
            .await?;
            out.extend(parse_ollama_response(&json)?);
        }

        Ok(out)
    }
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| HarnessError::external("Invalid Ollama response: missing embeddings array"))?
        .iter()
        .map(|embedding| to_vector(embedding, "Ollama"))
        .collect()
}

fn to_vector(value: &Value, service: &str) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| {
            HarnessError::external(format!(
                "Invalid {} response: embedding is not an array",
                service
            ))
        })?
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                HarnessError::external(format!(
                    "Invalid {} response: embedding contains a non-number",
                    service
                ))
            })
        })
        .collect()
}

// ============ Hash Provider ============

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001B3;

/// Offline embedder using FNV-1a feature hashing of lowercase word tokens.
///
/// Each token adds ±1 to one bucket; the result is L2-normalised. Texts
/// sharing words land close together, which is enough for smoke tests and
/// for benchmarking without a model server.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
    name: String,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        let dims = dims.max(1);
        Self {
            dims,
            name: format!("fnv1a-hash-{}", dims),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        let lower = text.to_lowercase();
        for token in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % self.dims as u64) as usize;
            let sign = if (h >> 32) & 1 == 0 { 1.0f32 } else { -1.0f32 };
            vector[bucket] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

// ============ Local Provider (fastembed) ============

/// Embedding provider for local inference with fastembed.
///
/// The model is downloaded from Hugging Face on first use and cached;
/// afterwards embeddings run entirely offline. Inference runs on the
/// blocking thread pool.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let (model_name, dims) = resolve_local_model(config);
        config_to_fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size.max(1),
            model: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| "all-minilm-l6-v2".to_string());

    let dims = config.dims.unwrap_or(match model_name.as_str() {
        "bge-base-en-v1.5" | "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        _ => 384,
    });

    (model_name, dims)
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> anyhow::Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => anyhow::bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let fastembed_model = config_to_fastembed_model(&self.model_name)
            .map_err(|e| HarnessError::external(e.to_string()))?;
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| HarnessError::external("local embedding model lock poisoned"))?;
            if guard.is_none() {
                let loaded = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
                )
                .map_err(|e| {
                    HarnessError::external(format!(
                        "Failed to initialize local embedding model: {}",
                        e
                    ))
                })?;
                *guard = Some(loaded);
            }
            let engine = guard
                .as_mut()
                .ok_or_else(|| HarnessError::external("local embedding model unavailable"))?;
            engine
                .embed(texts, Some(batch_size))
                .map_err(|e| HarnessError::external(format!("Local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| HarnessError::external(format!("embedding task failed: {}", e)))?
    }
}

/// Create the configured embedding backend, wrapped in a cache.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"hash"` | [`HashEmbedder`] |
/// | `"local"` | `LocalEmbedder` (requires `local-embeddings-fastembed`) |
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    let inner: Arc<dyn Embedder> = match config.provider.as_str() {
        "disabled" => Arc::new(DisabledEmbedder),
        "openai" => Arc::new(OpenAIEmbedder::new(config)?),
        "ollama" => Arc::new(OllamaEmbedder::new(config)?),
        "hash" => Arc::new(HashEmbedder::new(config.dims.unwrap_or(DEFAULT_HASH_DIMS))),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Arc::new(LocalEmbedder::new(config)?),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => anyhow::bail!(
            "Local embedding provider requires --features local-embeddings-fastembed"
        ),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    };

    Ok(Arc::new(CachedEmbedder::new(
        inner,
        EmbeddingCache::new(config.cache_capacity),
    )))
}
