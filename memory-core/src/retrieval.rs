//! The staged, ranked retrieval pipeline (spec.md §4.6), ported from
//! `original_source/src/core/retrieval.py`.

use crate::embeddings::{cosine_similarity, EmbedKind, EmbeddingService};
use crate::error::Result;
use crate::ids::MemoryId;
use crate::ml::reranker::{extract_features, RerankerModel};
use crate::storage::{EphemeralStore, GraphStore, SearchFilters, VectorStore};
use crate::types::{Memory, MemorySource, MemoryType, RetrievalResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

const GRAPH_SEED_COUNT: usize = 5;
const GRAPH_ACTIVATION_THRESHOLD: f64 = 0.20;
const GRAPH_SCORE_CAP: f64 = 0.15;
const DOCUMENT_SIBLING_SOURCES: usize = 5;
const ANTI_PATTERN_LIMIT: usize = 3;
const ANTI_PATTERN_MIN_SIMILARITY: f64 = 0.3;
const RERANKER_CACHE_TTL_SECS: u64 = 60;

#[derive(Debug, Clone, Default)]
pub struct MemoryQuery {
    pub text: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub memory_types: Option<Vec<MemoryType>>,
    pub domains: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub min_importance: Option<f64>,
    pub min_confidence: Option<f64>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub expand_relationships: bool,
    pub relationship_types: Option<Vec<crate::types::RelationshipType>>,
    pub max_depth: u32,
    pub limit: usize,
    pub session_id: Option<String>,
    pub current_file: Option<String>,
    pub current_task: Option<String>,
    pub username: Option<String>,
}

/// Process-wide retrieval pipeline singleton. Constructed once (spec.md §5)
/// and reused across queries.
pub struct RetrievalPipeline {
    vectors: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    ephemeral: Arc<dyn EphemeralStore>,
    embeddings: Arc<EmbeddingService>,
}

impl RetrievalPipeline {
    #[must_use]
    pub fn new(vectors: Arc<dyn VectorStore>, graph: Arc<dyn GraphStore>, ephemeral: Arc<dyn EphemeralStore>, embeddings: Arc<EmbeddingService>) -> Self {
        Self { vectors, graph, ephemeral, embeddings }
    }

    pub async fn retrieve(&self, query: MemoryQuery, browse_mode: bool) -> Result<Vec<RetrievalResult>> {
        let embedding = match (&query.embedding, &query.text) {
            (Some(v), _) => v.clone(),
            (None, Some(text)) => self.embeddings.embed(text, EmbedKind::Query).await?,
            (None, None) => Vec::new(),
        };

        let mut working: HashMap<MemoryId, RetrievalResult> = HashMap::new();

        self.stage_vector_search(&query, &embedding, &mut working).await?;
        self.stage_fact_search(&embedding, &mut working).await?;
        if query.expand_relationships {
            self.stage_graph_expansion(&query, &mut working).await?;
        }
        self.stage_document_sibling_boost(&mut working).await?;
        self.stage_context_filter(&query, &mut working).await?;
        self.stage_anti_pattern_injection(&query, &embedding, &mut working).await?;

        let mut results: Vec<RetrievalResult> = working.into_values().collect();
        self.stage_rank(&mut results).await?;
        self.stage_inhibit(&mut results).await?;

        results.truncate(query.limit.max(1));

        if !browse_mode {
            self.spawn_access_tracking(results.clone());
        }

        Ok(results)
    }

    fn filters_from_query(query: &MemoryQuery) -> SearchFilters {
        SearchFilters {
            memory_types: query.memory_types.clone(),
            domains: query.domains.clone(),
            min_importance: query.min_importance,
            session_id: query.session_id.clone(),
            created_after: query.created_after,
            created_before: query.created_before,
            username: query.username.clone(),
            include_superseded: false,
        }
    }

    async fn stage_vector_search(&self, query: &MemoryQuery, embedding: &[f32], working: &mut HashMap<MemoryId, RetrievalResult>) -> Result<()> {
        if embedding.is_empty() {
            return Ok(());
        }
        let filters = Self::filters_from_query(query);
        let over_fetch = query.limit.max(1) * 2;
        let hits = self.vectors.search(embedding, over_fetch, &filters).await?;
        for hit in hits {
            let score = hit.similarity * hit.memory.importance.max(0.15);
            working.insert(
                hit.id.clone(),
                RetrievalResult { memory: hit.memory, score, similarity: hit.similarity, graph_distance: 0, retrieval_path: vec![hit.id] },
            );
        }
        Ok(())
    }

    async fn stage_fact_search(&self, embedding: &[f32], working: &mut HashMap<MemoryId, RetrievalResult>) -> Result<()> {
        if embedding.is_empty() {
            return Ok(());
        }
        let fact_hits = self.vectors.search_facts(embedding, 10).await?;
        for (fact, similarity) in fact_hits {
            if let Some(existing) = working.get_mut(&fact.parent_id) {
                existing.score *= 1.1;
            } else if let Some((_, parent)) = self.vectors.get(&fact.parent_id).await? {
                let score = similarity * parent.importance.max(0.15) * 1.15;
                working.insert(
                    fact.parent_id.clone(),
                    RetrievalResult { memory: parent, score, similarity, graph_distance: 0, retrieval_path: vec![fact.parent_id] },
                );
            }
        }
        Ok(())
    }

    async fn stage_graph_expansion(&self, query: &MemoryQuery, working: &mut HashMap<MemoryId, RetrievalResult>) -> Result<()> {
        if working.is_empty() {
            return Ok(());
        }
        let mut seeds: Vec<&RetrievalResult> = working.values().collect();
        seeds.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let seed_ids: Vec<MemoryId> = seeds.into_iter().take(GRAPH_SEED_COUNT).map(|r| r.memory.id.clone()).collect();

        let relationship_types = query.relationship_types.as_deref();
        let max_depth = query.max_depth.clamp(1, 10);

        // Parallel fan-out: one query per seed (spec.md §5).
        let futures = seed_ids.iter().map(|seed| self.graph.find_related(seed, relationship_types, max_depth, 200));
        let per_seed = futures::future::join_all(futures).await;

        let mut best_activation: HashMap<MemoryId, (f64, Vec<MemoryId>)> = HashMap::new();
        for (seed, neighbors) in seed_ids.iter().zip(per_seed) {
            let neighbors = neighbors?;
            for neighbor in neighbors {
                let mut activation = 1.0;
                for (hop, strength) in neighbor.rel_strengths.iter().enumerate() {
                    let clamped = strength.clamp(0.01, 1.0);
                    activation *= clamped * (1.0 / (1.0 + ((hop + 1) as f64) * 0.3));
                }
                activation *= neighbor.importance.max(0.5);

                if activation < GRAPH_ACTIVATION_THRESHOLD {
                    continue;
                }

                let entry = best_activation.entry(neighbor.id.clone()).or_insert((0.0, vec![]));
                if activation > entry.0 {
                    let mut path = vec![seed.clone()];
                    path.push(neighbor.id.clone());
                    *entry = (activation, path);
                }

                if !working.contains_key(&neighbor.id) {
                    // Memory payload comes from the graph-node's own cached
                    // metadata; full content is fetched lazily via vector
                    // store on next access (store carries a preview only).
                    if let Some((_, memory)) = self.vectors.get(&neighbor.id).await? {
                        let score = activation.min(GRAPH_SCORE_CAP);
                        let path = best_activation.get(&neighbor.id).map(|(_, p)| p.clone()).unwrap_or_default();
                        working.insert(
                            neighbor.id.clone(),
                            RetrievalResult { memory, score, similarity: 0.0, graph_distance: neighbor.distance, retrieval_path: path },
                        );
                    }
                } else if let Some(existing) = working.get_mut(&neighbor.id) {
                    existing.score *= 1.2;
                }
            }
        }
        Ok(())
    }

    async fn stage_document_sibling_boost(&self, working: &mut HashMap<MemoryId, RetrievalResult>) -> Result<()> {
        let document_sources: Vec<(String, MemoryId)> =
            working.values().filter_map(|r| r.memory.document_id().map(|d| (d.to_string(), r.memory.id.clone()))).take(DOCUMENT_SIBLING_SOURCES).collect();

        for (document_id, source_id) in document_sources {
            let (memories, _) = self.graph.get_subgraph(&[source_id]).await.unwrap_or_default();
            for memory in memories {
                if memory.document_id() == Some(document_id.as_str()) && !working.contains_key(&memory.id) {
                    let score = 0.3 * memory.importance;
                    working.insert(
                        memory.id.clone(),
                        RetrievalResult { memory: memory.clone(), score, similarity: 0.0, graph_distance: 1, retrieval_path: vec![memory.id] },
                    );
                }
            }
        }
        Ok(())
    }

    async fn stage_context_filter(&self, query: &MemoryQuery, working: &mut HashMap<MemoryId, RetrievalResult>) -> Result<()> {
        let session_working_memory: Vec<MemoryId> = if let Some(session_id) = &query.session_id {
            self.ephemeral.get_working_memory(session_id).await.unwrap_or_default()
        } else {
            Vec::new()
        };

        let task_tokens: Vec<String> = query.current_task.as_deref().map(tokenize).unwrap_or_default();

        for result in working.values_mut() {
            if session_working_memory.contains(&result.memory.id) {
                result.score *= 1.5;
            }
            if let Some(file) = &query.current_file {
                if file.to_lowercase().contains(&result.memory.domain.to_lowercase()) {
                    result.score *= 1.3;
                }
            }
            if !task_tokens.is_empty() {
                let overlap = result.memory.tags.iter().filter(|t| task_tokens.contains(&t.to_lowercase())).count();
                result.score *= 1.0 + 0.2 * overlap as f64;
            }
        }
        Ok(())
    }

    async fn stage_anti_pattern_injection(&self, query: &MemoryQuery, embedding: &[f32], working: &mut HashMap<MemoryId, RetrievalResult>) -> Result<()> {
        if embedding.is_empty() {
            return Ok(());
        }
        let domain_hint = query
            .domains
            .as_ref()
            .and_then(|d| d.first().cloned())
            .or_else(|| query.current_file.as_ref().map(|f| crate::domains::normalize_domain(f)));

        let hits = self.vectors.search_anti_patterns(embedding, ANTI_PATTERN_LIMIT, ANTI_PATTERN_MIN_SIMILARITY).await?;
        for (anti_pattern, similarity) in hits {
            let mut score = similarity * 0.8;
            if let Some(hint) = &domain_hint {
                if hint == &anti_pattern.domain {
                    score *= 1.4;
                }
            }
            score *= 1.0 + 0.1 * (1.0 + anti_pattern.times_triggered as f64).log2();

            let content = format!("WARNING: {} — {}", anti_pattern.pattern, anti_pattern.warning);
            let mut memory = Memory::new(content, MemoryType::Semantic, MemorySource::System, anti_pattern.domain.clone());
            memory.id = anti_pattern.id.clone();
            memory.tags = anti_pattern.tags.clone();
            memory.metadata.insert("is_anti_pattern".to_string(), serde_json::Value::Bool(true));

            working.insert(
                anti_pattern.id.clone(),
                RetrievalResult { memory, score, similarity, graph_distance: 0, retrieval_path: vec![anti_pattern.id.clone()] },
            );

            let _ = self.vectors.increment_triggered(&anti_pattern.id).await;
        }
        Ok(())
    }

    async fn stage_rank(&self, results: &mut [RetrievalResult]) -> Result<()> {
        let model = self.load_cached_reranker().await;
        let now = Utc::now();

        if let Some(model) = model {
            for result in results.iter_mut() {
                let features = extract_features(result, now);
                let p = model.predict(&features);
                result.score = 0.7 * p + 0.3 * result.similarity;
            }
        } else {
            for result in results.iter_mut() {
                let hours_since_access = (now - result.memory.last_accessed).num_seconds().max(0) as f64 / 3600.0;
                let recency = 1.0 / (1.0 + hours_since_access * 0.01);
                let stability = 0.5 + 0.5 * result.memory.stability;
                let confidence = 0.7 + 0.3 * result.memory.confidence;
                result.score *= recency * stability * confidence;
            }
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(())
    }

    async fn load_cached_reranker(&self) -> Option<RerankerModel> {
        let cached = self.ephemeral.get_cached_value("reranker_model_cache").await.ok().flatten();
        if let Some(value) = cached {
            return serde_json::from_value(value).ok();
        }
        let raw = self.ephemeral.get_model_weights(crate::storage::RERANKER_WEIGHTS_KEY).await.ok().flatten()?;
        let model: RerankerModel = serde_json::from_value(raw.clone()).ok()?;
        let _ = self.ephemeral.set_cached_value("reranker_model_cache", &raw, RERANKER_CACHE_TTL_SECS).await;
        Some(model)
    }

    async fn stage_inhibit(&self, results: &mut Vec<RetrievalResult>) -> Result<()> {
        let ids: Vec<MemoryId> = results.iter().map(|r| r.memory.id.clone()).collect();
        let contradictions = self.graph.find_contradictions(&ids).await.unwrap_or_default();

        let mut index_of: HashMap<MemoryId, usize> = HashMap::new();
        for (i, r) in results.iter().enumerate() {
            index_of.insert(r.memory.id.clone(), i);
        }

        for (a, b) in contradictions {
            if let (Some(&ia), Some(&ib)) = (index_of.get(&a), index_of.get(&b)) {
                let (lower, _higher) = if results[ia].score <= results[ib].score { (ia, ib) } else { (ib, ia) };
                results[lower].score *= 0.7;
            }
        }

        // Suppress near-duplicates by content hash, keep highest-scored.
        let mut best_by_hash: HashMap<String, usize> = HashMap::new();
        for (i, r) in results.iter().enumerate() {
            match best_by_hash.get(&r.memory.content_hash) {
                Some(&existing) if results[existing].score >= r.score => {}
                _ => {
                    best_by_hash.insert(r.memory.content_hash.clone(), i);
                }
            }
        }
        let keep: std::collections::HashSet<usize> = best_by_hash.into_values().collect();
        let mut kept: Vec<RetrievalResult> = results.drain(..).enumerate().filter(|(i, _)| keep.contains(i)).map(|(_, r)| r).collect();
        kept.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        *results = kept;
        Ok(())
    }

    fn spawn_access_tracking(&self, results: Vec<RetrievalResult>) {
        let vectors = self.vectors.clone();
        let graph = self.graph.clone();
        tokio::spawn(async move {
            for result in results {
                if result.memory.is_anti_pattern() {
                    continue;
                }
                let new_importance = (result.memory.importance + 0.02).min(1.0);
                let now = Utc::now();
                if let Err(err) = vectors.update_access(&result.memory.id, result.memory.access_count + 1, now).await {
                    tracing::warn!(memory_id = %result.memory.id, error = %err, "access tracking update_access failed");
                }
                if let Err(err) = vectors.update_importance(&result.memory.id, new_importance).await {
                    tracing::warn!(memory_id = %result.memory.id, error = %err, "access tracking vector update_importance failed");
                }
                if let Err(err) = graph.update_importance(&result.memory.id, new_importance).await {
                    tracing::warn!(memory_id = %result.memory.id, error = %err, "access tracking graph update_importance failed");
                }
            }
        });
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(|t| t.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases() {
        assert_eq!(tokenize("Fix Auth Bug"), vec!["fix", "auth", "bug"]);
    }
}
