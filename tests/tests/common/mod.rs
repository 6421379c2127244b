//! Shared harness for the workspace end-to-end tests (spec.md §8): a
//! deterministic bag-of-words embedding backend (so cosine similarity
//! reflects word overlap without a real embedding service) wired to the
//! four in-memory store fakes from `do-memory-test-utils`.

use async_trait::async_trait;
use do_memory_core::embeddings::{EmbeddingBackend, EmbeddingService};
use do_memory_core::error::Result;
use do_memory_test_utils::InMemoryBackend;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

const DIM: usize = 64;

/// Embeds text as a bag-of-words vector: each lowercased word hashes to a
/// dimension it increments, then the vector is L2-normalized. Texts sharing
/// words get non-trivial cosine similarity; unrelated texts land near
/// orthogonal. Deterministic and fast, no network calls.
pub struct FakeEmbeddingBackend;

fn embed_text(text: &str) -> Vec<f32> {
    let mut v = vec![0.0_f32; DIM];
    for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        let bucket = (hasher.finish() as usize) % DIM;
        v[bucket] += 1.0;
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl EmbeddingBackend for FakeEmbeddingBackend {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        Ok(embed_text(text))
    }

    async fn embed_batch_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| embed_text(t)).collect())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

pub struct Harness {
    pub backend: InMemoryBackend,
    pub embeddings: Arc<EmbeddingService>,
}

impl Harness {
    pub fn new() -> Self {
        Self { backend: InMemoryBackend::new(), embeddings: Arc::new(EmbeddingService::new(Box::new(FakeEmbeddingBackend))) }
    }

    pub fn pipeline(&self) -> do_memory_core::retrieval::RetrievalPipeline {
        do_memory_core::retrieval::RetrievalPipeline::new(
            self.backend.vector.clone(),
            self.backend.graph.clone(),
            self.backend.ephemeral.clone(),
            self.embeddings.clone(),
        )
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
