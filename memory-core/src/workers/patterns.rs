//! Pattern extractor: clusters episodic memories around recurring anchor
//! phrases and distills them into `semantic`/`pattern` memories (spec.md
//! §4.9), ported from `original_source/src/core/patterns.py`.

use crate::embeddings::{cosine_similarity, EmbedKind, EmbeddingService};
use crate::error::Result;
use crate::storage::{GraphStore, RowStore, SearchFilters, VectorStore};
use crate::types::{AuditEntry, Memory, MemorySource, MemoryType};
use std::collections::HashMap;
use std::sync::Arc;

/// Fixed set of anchor phrases used to seed the ANN search over episodic
/// memories (spec.md §4.9 step 1).
const ANCHOR_PHRASES: [&str; 6] =
    ["I always", "I usually", "I tend to", "I prefer to", "the pattern is", "every time I"];

const ANCHOR_SEARCH_LIMIT: usize = 50;
const CLUSTER_SIMILARITY_THRESHOLD: f64 = 0.8;
const MIN_CLUSTER_SIZE: usize = 3;
const DUPLICATE_SIMILARITY_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PatternExtractionStats {
    pub candidates_found: u64,
    pub clusters_formed: u64,
    pub patterns_created: u64,
    pub duplicates_skipped: u64,
}

pub struct PatternExtractor {
    vectors: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    rows: Arc<dyn RowStore>,
    embeddings: Arc<EmbeddingService>,
}

impl PatternExtractor {
    #[must_use]
    pub fn new(vectors: Arc<dyn VectorStore>, graph: Arc<dyn GraphStore>, rows: Arc<dyn RowStore>, embeddings: Arc<EmbeddingService>) -> Self {
        Self { vectors, graph, rows, embeddings }
    }

    pub async fn run(&self) -> Result<PatternExtractionStats> {
        let mut stats = PatternExtractionStats::default();
        let candidates = self.gather_candidates().await?;
        stats.candidates_found = candidates.len() as u64;

        if candidates.len() < MIN_CLUSTER_SIZE {
            return Ok(stats);
        }

        let clusters = Self::cluster(&candidates);
        stats.clusters_formed = clusters.len() as u64;

        for cluster in clusters {
            if cluster.len() < MIN_CLUSTER_SIZE {
                continue;
            }
            let memories: Vec<Memory> = cluster.into_iter().map(|(m, _)| m).collect();
            match self.create_pattern(&memories).await {
                Ok(true) => stats.patterns_created += 1,
                Ok(false) => stats.duplicates_skipped += 1,
                Err(err) => tracing::warn!(error = %err, "pattern creation failed"),
            }
        }

        Ok(stats)
    }

    /// ANN search seeded from each anchor phrase, deduped by id (spec.md
    /// §4.9 step 1).
    async fn gather_candidates(&self) -> Result<Vec<(Memory, Vec<f32>)>> {
        let mut seen = std::collections::HashSet::new();
        let mut candidates = Vec::new();

        let filters = SearchFilters { memory_types: Some(vec![MemoryType::Episodic]), ..Default::default() };

        for anchor in ANCHOR_PHRASES {
            let embedding = self.embeddings.embed(anchor, EmbedKind::Query).await?;
            let hits = self.vectors.search(&embedding, ANCHOR_SEARCH_LIMIT, &filters).await?;
            for hit in hits {
                if seen.insert(hit.id.clone()) {
                    if let Some((vector, memory)) = self.vectors.get(&hit.id).await? {
                        candidates.push((memory, vector));
                    }
                }
            }
        }

        Ok(candidates)
    }

    /// Greedy cosine clustering, identical shape to the consolidation
    /// worker's (spec.md §4.9 step 2).
    fn cluster(candidates: &[(Memory, Vec<f32>)]) -> Vec<Vec<(Memory, Vec<f32>)>> {
        let mut clustered = vec![false; candidates.len()];
        let mut clusters = Vec::new();

        for i in 0..candidates.len() {
            if clustered[i] {
                continue;
            }
            let mut cluster = vec![candidates[i].clone()];
            clustered[i] = true;

            for j in 0..candidates.len() {
                if i == j || clustered[j] {
                    continue;
                }
                if cosine_similarity(&candidates[i].1, &candidates[j].1) >= CLUSTER_SIMILARITY_THRESHOLD {
                    cluster.push(candidates[j].clone());
                    clustered[j] = true;
                }
            }

            clusters.push(cluster);
        }

        clusters
    }

    /// Derive a semantic/pattern memory from a cluster's majority domain and
    /// common tags, skipping creation if a near-duplicate already exists
    /// (spec.md §4.9 steps 3-4).
    async fn create_pattern(&self, cluster: &[Memory]) -> Result<bool> {
        let domain = majority_domain(cluster);
        let tags = common_tags(cluster);
        let content = format!(
            "Recurring pattern across {} related experiences: {}",
            cluster.len(),
            cluster.iter().map(|m| m.content.as_str()).take(3).collect::<Vec<_>>().join("; ")
        );

        let embedding = self.embeddings.embed(&content, EmbedKind::Passage).await?;

        let duplicate_filters = SearchFilters { memory_types: Some(vec![MemoryType::Semantic]), ..Default::default() };
        let existing = self.vectors.search(&embedding, 5, &duplicate_filters).await?;
        if existing.iter().any(|hit| hit.similarity >= DUPLICATE_SIMILARITY_THRESHOLD) {
            return Ok(false);
        }

        let mut pattern = Memory::new(content, MemoryType::Semantic, MemorySource::Pattern, domain);
        pattern.tags = tags;
        pattern.tags.push("extracted_pattern".to_string());
        pattern.importance = 0.7;
        pattern.initial_importance = 0.7;
        pattern.stability = 0.5;
        pattern.confidence = (cluster.len() as f64 / 10.0).min(1.0);
        pattern.parent_ids = cluster.iter().map(|m| m.id.clone()).collect();
        pattern.metadata.insert("is_pattern".to_string(), serde_json::Value::Bool(true));
        pattern.metadata.insert("source_count".to_string(), serde_json::json!(cluster.len()));

        let outcome = self.vectors.store(&pattern, &embedding).await?;
        if !outcome.created {
            return Ok(false);
        }
        self.graph.create_memory_node(&pattern).await?;

        for source in cluster {
            let relationship = crate::types::Relationship::new(pattern.id.clone(), source.id.clone(), crate::types::RelationshipType::DerivedFrom, 0.8);
            let _ = self.graph.create_relationship(&relationship).await;
        }

        let _ = self
            .rows
            .log_audit(&AuditEntry::new(
                "pattern_extract",
                Some(pattern.id.clone()),
                "pattern_extractor",
                serde_json::json!({ "source_count": cluster.len() }),
            ))
            .await;

        Ok(true)
    }
}

fn majority_domain(cluster: &[Memory]) -> String {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for memory in cluster {
        *counts.entry(memory.domain.as_str()).or_insert(0) += 1;
    }
    counts.into_iter().max_by_key(|(_, count)| *count).map(|(domain, _)| domain.to_string()).unwrap_or_else(|| "general".to_string())
}

/// Tags present in at least half the cluster's members.
fn common_tags(cluster: &[Memory]) -> Vec<String> {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for memory in cluster {
        for tag in &memory.tags {
            *counts.entry(tag.as_str()).or_insert(0) += 1;
        }
    }
    let threshold = (cluster.len() as f64 / 2.0).ceil() as u32;
    let mut tags: Vec<String> = counts.into_iter().filter(|(_, count)| *count >= threshold).map(|(tag, _)| tag.to_string()).collect();
    tags.sort();
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemorySource;

    fn memory_with(domain: &str, tags: &[&str]) -> Memory {
        let mut m = Memory::new("content", MemoryType::Episodic, MemorySource::User, domain);
        m.tags = tags.iter().map(|t| (*t).to_string()).collect();
        m
    }

    #[test]
    fn majority_domain_picks_most_common() {
        let cluster = vec![memory_with("rust", &[]), memory_with("rust", &[]), memory_with("python", &[])];
        assert_eq!(majority_domain(&cluster), "rust");
    }

    #[test]
    fn common_tags_requires_half_presence() {
        let cluster = vec![memory_with("rust", &["async", "tokio"]), memory_with("rust", &["async"]), memory_with("rust", &[])];
        let tags = common_tags(&cluster);
        assert_eq!(tags, vec!["async".to_string()]);
    }
}
