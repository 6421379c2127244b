//! Embedding wrapper with an in-process LRU cache (spec.md §4.1), ported
//! from `original_source/src/core/embeddings.py`.

use crate::error::{Backend, Error, Result};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Whether the text is being embedded as a stored passage or a live query.
/// A `query` prefix prepends a fixed instruction template; `passage` does
/// not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedKind {
    Passage,
    Query,
}

const QUERY_INSTRUCTION: &str = "Represent this query for retrieving relevant memories: ";

/// Low-level backend the wrapper calls through to. Implementations talk to
/// an embedding HTTP service (Ollama-compatible `/embed`, OpenAI, etc.).
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>>;

    /// Attempt a single batched call; callers fall back to sequential
    /// per-item calls on failure.
    async fn embed_batch_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn health_check(&self) -> Result<()>;
}

const CACHE_MAX: usize = 200;
const CACHE_TTL: Duration = Duration::from_secs(300);

struct CacheEntry {
    vector: Vec<f32>,
    inserted_at: Instant,
}

/// Embedding service: cached, prefix-aware wrapper over an
/// [`EmbeddingBackend`].
pub struct EmbeddingService {
    backend: Box<dyn EmbeddingBackend>,
    cache: Mutex<LruCache<String, CacheEntry>>,
}

impl EmbeddingService {
    #[must_use]
    pub fn new(backend: Box<dyn EmbeddingBackend>) -> Self {
        Self {
            backend,
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(CACHE_MAX).unwrap())),
        }
    }

    fn cache_key(kind: EmbedKind, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update([kind as u8]);
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn prefixed(kind: EmbedKind, text: &str) -> String {
        match kind {
            EmbedKind::Query => format!("{QUERY_INSTRUCTION}{text}"),
            EmbedKind::Passage => text.to_string(),
        }
    }

    /// Embed a single text, using the LRU cache when possible.
    pub async fn embed(&self, text: &str, kind: EmbedKind) -> Result<Vec<f32>> {
        let key = Self::cache_key(kind, text);
        if let Some(hit) = self.cache_get(&key) {
            return Ok(hit);
        }
        let rendered = Self::prefixed(kind, text);
        let vector = self.backend.embed_one(&rendered).await.map_err(|e| match e {
            Error::Unavailable(_, msg) => Error::Unavailable(Backend::Embedding, msg),
            other => other,
        })?;
        self.cache_put(key, vector.clone());
        Ok(vector)
    }

    /// Embed a batch; attempts a single backend call, falling back to
    /// sequential per-item calls on any failure (so partial results remain
    /// possible even when the backend rejects batching).
    pub async fn embed_batch(&self, texts: &[String], kind: EmbedKind) -> Result<Vec<Vec<f32>>> {
        let mut to_fetch = Vec::new();
        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut keys = Vec::with_capacity(texts.len());

        for text in texts {
            let key = Self::cache_key(kind, text);
            if let Some(hit) = self.cache_get(&key) {
                results.push(Some(hit));
            } else {
                results.push(None);
                to_fetch.push(Self::prefixed(kind, text));
            }
            keys.push(key);
        }

        if !to_fetch.is_empty() {
            let fetched = match self.backend.embed_batch_raw(&to_fetch).await {
                Ok(v) if v.len() == to_fetch.len() => v,
                _ => {
                    let mut sequential = Vec::with_capacity(to_fetch.len());
                    for text in &to_fetch {
                        sequential.push(self.backend.embed_one(text).await?);
                    }
                    sequential
                }
            };

            let mut fetched_iter = fetched.into_iter();
            for (i, slot) in results.iter_mut().enumerate() {
                if slot.is_none() {
                    let vector = fetched_iter.next().ok_or_else(|| Error::Internal("embedding batch size mismatch".to_string()))?;
                    self.cache_put(keys[i].clone(), vector.clone());
                    *slot = Some(vector);
                }
            }
        }

        Ok(results.into_iter().map(|v| v.unwrap_or_default()).collect())
    }

    pub async fn health_check(&self) -> Result<()> {
        self.backend.health_check().await
    }

    fn cache_get(&self, key: &str) -> Option<Vec<f32>> {
        let mut cache = self.cache.lock();
        if let Some(entry) = cache.get(key) {
            if entry.inserted_at.elapsed() < CACHE_TTL {
                return Some(entry.vector.clone());
            }
        }
        cache.pop(key);
        None
    }

    fn cache_put(&self, key: String, vector: Vec<f32>) {
        self.cache.lock().put(key, CacheEntry { vector, inserted_at: Instant::now() });
    }
}

/// Cosine similarity between two equal-length vectors.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingBackend for CountingBackend {
        async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, 1.0, 2.0])
        }

        async fn embed_batch_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::new();
            for t in texts {
                out.push(self.embed_one(t).await?);
            }
            Ok(out)
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn cache_hits_avoid_backend_calls() {
        let backend = CountingBackend { calls: AtomicUsize::new(0) };
        let service = EmbeddingService::new(Box::new(backend));
        let _ = service.embed("hello", EmbedKind::Passage).await.unwrap();
        let _ = service.embed("hello", EmbedKind::Passage).await.unwrap();
        // Second call should hit cache — verify indirectly: cache entry exists.
        assert!(service.cache_get(&EmbeddingService::cache_key(EmbedKind::Passage, "hello")).is_some());
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0_f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}
