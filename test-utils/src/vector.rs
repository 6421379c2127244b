//! Pure in-memory [`VectorStore`] fake: three logical collections (main
//! memories, facts, anti-patterns) backed by `Vec`s under a mutex, doing
//! brute-force cosine search instead of ANN. Good enough to validate
//! pipeline logic without a real Qdrant instance (spec.md §4.2).

use async_trait::async_trait;
use do_memory_core::storage::{SearchFilters, StoreOutcome, VectorHit, VectorStore};
use do_memory_core::{AntiPattern, Durability, Fact, Memory, MemoryId};
use do_memory_core::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    do_memory_core::embeddings::cosine_similarity(a, b)
}

struct Point {
    memory: Memory,
    embedding: Vec<f32>,
}

struct FactPoint {
    fact: Fact,
    embedding: Vec<f32>,
}

struct AntiPatternPoint {
    anti_pattern: AntiPattern,
    embedding: Vec<f32>,
}

#[derive(Default)]
struct Inner {
    points: HashMap<MemoryId, Point>,
    facts: Vec<FactPoint>,
    anti_patterns: HashMap<MemoryId, AntiPatternPoint>,
}

/// In-memory [`VectorStore`]. Cheap to clone (wraps an `Arc`-free
/// `Mutex`-guarded inner); tests typically wrap it in `Arc::new(..)` once.
#[derive(Default)]
pub struct InMemoryVectorStore {
    inner: Mutex<Inner>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_filters(memory: &Memory, filters: &SearchFilters) -> bool {
    if !filters.include_superseded && memory.superseded_by.is_some() {
        return false;
    }
    if let Some(types) = &filters.memory_types {
        if !types.contains(&memory.memory_type) {
            return false;
        }
    }
    if let Some(domains) = &filters.domains {
        if !domains.contains(&memory.domain) {
            return false;
        }
    }
    if let Some(min_importance) = filters.min_importance {
        if memory.importance < min_importance {
            return false;
        }
    }
    if let Some(session_id) = &filters.session_id {
        if memory.session_id.as_deref() != Some(session_id.as_str()) {
            return false;
        }
    }
    if let Some(after) = filters.created_after {
        if memory.created_at < after {
            return false;
        }
    }
    if let Some(before) = filters.created_before {
        if memory.created_at > before {
            return false;
        }
    }
    true
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn store(&self, memory: &Memory, embedding: &[f32]) -> Result<StoreOutcome> {
        let mut inner = self.inner.lock();
        if let Some((existing_id, _)) = inner.points.iter().find(|(_, p)| p.memory.content_hash == memory.content_hash && p.memory.superseded_by.is_none()) {
            return Ok(StoreOutcome { id: existing_id.clone(), created: false });
        }
        inner.points.insert(memory.id.clone(), Point { memory: memory.clone(), embedding: embedding.to_vec() });
        Ok(StoreOutcome { id: memory.id.clone(), created: true })
    }

    async fn get(&self, id: &MemoryId) -> Result<Option<(Vec<f32>, Memory)>> {
        Ok(self.inner.lock().points.get(id).map(|p| (p.embedding.clone(), p.memory.clone())))
    }

    async fn search(&self, embedding: &[f32], limit: usize, filters: &SearchFilters) -> Result<Vec<VectorHit>> {
        let inner = self.inner.lock();
        let mut hits: Vec<VectorHit> = inner
            .points
            .values()
            .filter(|p| matches_filters(&p.memory, filters))
            .map(|p| VectorHit { id: p.memory.id.clone(), similarity: cosine(embedding, &p.embedding), memory: p.memory.clone() })
            .collect();
        hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scroll_all(&self, include_superseded: bool, with_vectors: bool) -> Result<Vec<(Memory, Option<Vec<f32>>)>> {
        let inner = self.inner.lock();
        Ok(inner
            .points
            .values()
            .filter(|p| include_superseded || p.memory.superseded_by.is_none())
            .map(|p| (p.memory.clone(), with_vectors.then(|| p.embedding.clone())))
            .collect())
    }

    async fn scroll_time_range(
        &self,
        since: chrono::DateTime<chrono::Utc>,
        until: chrono::DateTime<chrono::Utc>,
        domain: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        let inner = self.inner.lock();
        let mut out: Vec<Memory> = inner
            .points
            .values()
            .map(|p| &p.memory)
            .filter(|m| m.created_at >= since && m.created_at <= until)
            .filter(|m| domain.is_none_or(|d| m.domain == d))
            .cloned()
            .collect();
        out.sort_by_key(|m| m.created_at);
        out.truncate(limit);
        Ok(out)
    }

    async fn update_importance(&self, id: &MemoryId, importance: f64) -> Result<()> {
        if let Some(p) = self.inner.lock().points.get_mut(id) {
            p.memory.importance = importance;
        }
        Ok(())
    }

    async fn update_access(&self, id: &MemoryId, access_count: u64, last_accessed: chrono::DateTime<chrono::Utc>) -> Result<()> {
        if let Some(p) = self.inner.lock().points.get_mut(id) {
            p.memory.access_count = access_count;
            p.memory.last_accessed = last_accessed;
        }
        Ok(())
    }

    async fn mark_superseded(&self, id: &MemoryId, superseded_by: &MemoryId) -> Result<()> {
        if let Some(p) = self.inner.lock().points.get_mut(id) {
            p.memory.superseded_by = Some(superseded_by.clone());
        }
        Ok(())
    }

    async fn set_pinned(&self, id: &MemoryId, pinned: bool) -> Result<()> {
        if let Some(p) = self.inner.lock().points.get_mut(id) {
            p.memory.pinned = pinned;
        }
        Ok(())
    }

    async fn set_durability(&self, id: &MemoryId, durability: Durability) -> Result<()> {
        if let Some(p) = self.inner.lock().points.get_mut(id) {
            p.memory.durability = durability;
        }
        Ok(())
    }

    async fn delete(&self, id: &MemoryId) -> Result<()> {
        self.inner.lock().points.remove(id);
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.inner.lock().points.values().filter(|p| p.memory.superseded_by.is_none()).count() as u64)
    }

    async fn count_pinned(&self) -> Result<u64> {
        Ok(self.inner.lock().points.values().filter(|p| p.memory.pinned).count() as u64)
    }

    async fn count_facts(&self) -> Result<u64> {
        Ok(self.inner.lock().facts.len() as u64)
    }

    async fn get_importance_distribution(&self) -> Result<Vec<f64>> {
        Ok(self.inner.lock().points.values().filter(|p| p.memory.superseded_by.is_none()).map(|p| p.memory.importance).collect())
    }

    async fn find_by_content_hash(&self, content_hash: &str) -> Result<Option<MemoryId>> {
        Ok(self
            .inner
            .lock()
            .points
            .values()
            .find(|p| p.memory.content_hash == content_hash && p.memory.superseded_by.is_none())
            .map(|p| p.memory.id.clone()))
    }

    async fn store_fact(&self, fact: &Fact, embedding: &[f32]) -> Result<()> {
        self.inner.lock().facts.push(FactPoint { fact: fact.clone(), embedding: embedding.to_vec() });
        Ok(())
    }

    async fn search_facts(&self, embedding: &[f32], limit: usize) -> Result<Vec<(Fact, f64)>> {
        let inner = self.inner.lock();
        let mut hits: Vec<(Fact, f64)> = inner.facts.iter().map(|f| (f.fact.clone(), cosine(embedding, &f.embedding))).collect();
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn create_anti_pattern(&self, anti_pattern: &AntiPattern, embedding: &[f32]) -> Result<()> {
        self.inner.lock().anti_patterns.insert(anti_pattern.id.clone(), AntiPatternPoint { anti_pattern: anti_pattern.clone(), embedding: embedding.to_vec() });
        Ok(())
    }

    async fn get_anti_pattern(&self, id: &MemoryId) -> Result<Option<AntiPattern>> {
        Ok(self.inner.lock().anti_patterns.get(id).map(|a| a.anti_pattern.clone()))
    }

    async fn delete_anti_pattern(&self, id: &MemoryId) -> Result<()> {
        self.inner.lock().anti_patterns.remove(id);
        Ok(())
    }

    async fn increment_triggered(&self, id: &MemoryId) -> Result<()> {
        if let Some(a) = self.inner.lock().anti_patterns.get_mut(id) {
            a.anti_pattern.times_triggered += 1;
        }
        Ok(())
    }

    async fn search_anti_patterns(&self, embedding: &[f32], limit: usize, min_similarity: f64) -> Result<Vec<(AntiPattern, f64)>> {
        let inner = self.inner.lock();
        let mut hits: Vec<(AntiPattern, f64)> = inner
            .anti_patterns
            .values()
            .map(|a| (a.anti_pattern.clone(), cosine(embedding, &a.embedding)))
            .filter(|(_, sim)| *sim >= min_similarity)
            .collect();
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}
