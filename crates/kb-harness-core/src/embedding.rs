//! Embedding trait, embedding cache, and vector utilities.
//!
//! Defines the [`Embedder`] trait every embedding backend implements, the
//! explicit [`EmbeddingCache`] (content-hash keyed, FIFO eviction), and
//! pure helpers for vector serialization and cosine similarity.
//!
//! Concrete backends (OpenAI, Ollama, hashing, fastembed) live in the
//! `kb-harness` app crate.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{HarnessError, Result};

/// An embedding backend.
///
/// `embed` returns one vector per input text, in input order. Backend
/// failures are reported as [`HarnessError::ExternalService`].
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single text.
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    embedder
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| HarnessError::external("empty embedding response"))
}

/// In-memory embedding cache keyed by the SHA-256 of the text.
///
/// Eviction policy: when `capacity > 0` and the cache is full, the entry
/// inserted earliest is dropped (FIFO). A capacity of `0` means
/// unbounded; use it only for short-lived processes.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    capacity: usize,
    entries: HashMap<String, Vec<f32>>,
    order: VecDeque<String>,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Cache key for a text: lowercase hex SHA-256.
    pub fn key_for(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, text: &str) -> Option<&Vec<f32>> {
        self.entries.get(&Self::key_for(text))
    }

    pub fn insert(&mut self, text: &str, vector: Vec<f32>) {
        let key = Self::key_for(text);
        if self.entries.contains_key(&key) {
            self.entries.insert(key, vector);
            return;
        }
        if self.capacity > 0 {
            while self.entries.len() >= self.capacity {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, vector);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// An [`Embedder`] that consults an [`EmbeddingCache`] before calling the
/// wrapped backend. Only cache misses are sent to the backend, in one
/// batch.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Mutex<EmbeddingCache>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, cache: EmbeddingCache) -> Self {
        Self {
            inner,
            cache: Mutex::new(cache),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, EmbeddingCache>> {
        self.cache
            .lock()
            .map_err(|_| HarnessError::storage("embedding cache lock poisoned"))
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut misses: Vec<String> = Vec::new();
        let mut miss_slots: Vec<usize> = Vec::new();
        {
            let cache = self.lock()?;
            for (i, text) in texts.iter().enumerate() {
                match cache.get(text) {
                    Some(v) => out.push(Some(v.clone())),
                    None => {
                        out.push(None);
                        misses.push(text.clone());
                        miss_slots.push(i);
                    }
                }
            }
        }

        if !misses.is_empty() {
            let vectors = self.inner.embed(&misses).await?;
            if vectors.len() != misses.len() {
                return Err(HarnessError::external(format!(
                    "embedding backend returned {} vectors for {} texts",
                    vectors.len(),
                    misses.len()
                )));
            }
            let mut cache = self.lock()?;
            for ((slot, text), vector) in miss_slots.into_iter().zip(&misses).zip(vectors) {
                cache.insert(text, vector.clone());
                out[slot] = Some(vector);
            }
        }

        out.into_iter()
            .map(|v| v.ok_or_else(|| HarnessError::external("missing embedding")))
            .collect()
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use kb_harness_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors,
/// zero vectors, or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Cosine distance `1 - cos(θ)`, clamped to be non-negative.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - cosine_similarity(a, b)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
        texts_seen: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts_seen.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_distance(&v, &v) < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite_distance_is_two() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_cache_fifo_eviction() {
        let mut cache = EmbeddingCache::new(2);
        cache.insert("a", vec![1.0]);
        cache.insert("b", vec![2.0]);
        cache.insert("c", vec![3.0]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("c"), Some(&vec![3.0]));
    }

    #[test]
    fn test_cache_reinsert_does_not_grow() {
        let mut cache = EmbeddingCache::new(2);
        cache.insert("a", vec![1.0]);
        cache.insert("a", vec![9.0]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), Some(&vec![9.0]));
    }

    #[test]
    fn test_cache_unbounded() {
        let mut cache = EmbeddingCache::unbounded();
        for i in 0..100 {
            cache.insert(&i.to_string(), vec![i as f32]);
        }
        assert_eq!(cache.len(), 100);
    }

    #[tokio::test]
    async fn test_cached_embedder_only_embeds_misses() {
        let inner = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
            texts_seen: AtomicUsize::new(0),
        });
        let cached = CachedEmbedder::new(inner.clone(), EmbeddingCache::unbounded());

        let first = cached
            .embed(&["one".to_string(), "three".to_string()])
            .await
            .unwrap();
        let second = cached
            .embed(&["three".to_string(), "four".to_string(), "one".to_string()])
            .await
            .unwrap();

        assert_eq!(first[1], vec![5.0, 1.0]);
        assert_eq!(second[0], vec![5.0, 1.0]);
        assert_eq!(second[1], vec![4.0, 1.0]);
        assert_eq!(second[2], vec![3.0, 1.0]);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(inner.texts_seen.load(Ordering::SeqCst), 3);
        assert_eq!(cached.cached_entries(), 3);
    }
}
