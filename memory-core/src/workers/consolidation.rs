//! Consolidation worker: greedy cosine clustering + LLM merge (spec.md
//! §4.8), ported from `original_source/src/core/consolidation.py`.

use crate::embeddings::{cosine_similarity, EmbedKind, EmbeddingService};
use crate::error::Result;
use crate::ids::MemoryId;
use crate::llm::{GenerateOptions, LlmClient};
use crate::storage::{max_durability, GraphStore, RowStore, VectorStore};
use crate::types::{AuditEntry, ConsolidationResult, Memory, MemorySource, MemoryType, Relationship, RelationshipType};
use std::sync::Arc;

/// Optional filters narrowing which memories are eligible for
/// consolidation (spec.md §4.8).
#[derive(Debug, Clone, Default)]
pub struct ConsolidationFilters {
    pub memory_type: Option<MemoryType>,
    pub domain: Option<String>,
    pub dry_run: bool,
}

pub struct ConsolidationWorker {
    vectors: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    rows: Arc<dyn RowStore>,
    embeddings: Arc<EmbeddingService>,
    llm: Option<Arc<dyn LlmClient>>,
    consolidation_threshold: f64,
    min_importance_for_retrieval: f64,
    min_cluster_size: usize,
}

impl ConsolidationWorker {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        rows: Arc<dyn RowStore>,
        embeddings: Arc<EmbeddingService>,
        llm: Option<Arc<dyn LlmClient>>,
        consolidation_threshold: f64,
        min_importance_for_retrieval: f64,
        min_cluster_size: usize,
    ) -> Self {
        Self { vectors, graph, rows, embeddings, llm, consolidation_threshold, min_importance_for_retrieval, min_cluster_size }
    }

    /// Run one consolidation pass; a process-local lock around invocations
    /// is the caller's responsibility (spec.md §5).
    pub async fn consolidate(&self, filters: &ConsolidationFilters) -> Result<Vec<ConsolidationResult>> {
        let eligible = self.eligible_memories(filters).await?;
        if eligible.len() < self.min_cluster_size {
            return Ok(Vec::new());
        }

        let clusters = self.cluster_memories(eligible);
        let mut results = Vec::new();

        for cluster in clusters {
            if cluster.len() < self.min_cluster_size {
                continue;
            }
            if filters.dry_run {
                continue;
            }
            if let Some(result) = self.merge_cluster(cluster).await {
                results.push(result);
            }
        }

        Ok(results)
    }

    async fn eligible_memories(&self, filters: &ConsolidationFilters) -> Result<Vec<(Memory, Vec<f32>)>> {
        let scrolled = self.vectors.scroll_all(false, true).await?;
        let mut out = Vec::new();
        for (memory, embedding) in scrolled {
            let Some(embedding) = embedding else { continue };
            if let Some(mt) = filters.memory_type {
                if memory.memory_type != mt {
                    continue;
                }
            }
            if let Some(domain) = &filters.domain {
                if &memory.domain != domain {
                    continue;
                }
            }
            if memory.importance < self.min_importance_for_retrieval {
                continue;
            }
            out.push((memory, embedding));
        }
        Ok(out)
    }

    /// Greedy O(n²) cosine clustering (spec.md §4.8 step 2: acceptable at
    /// these sizes).
    fn cluster_memories(&self, memories: Vec<(Memory, Vec<f32>)>) -> Vec<Vec<Memory>> {
        let mut clustered = vec![false; memories.len()];
        let mut clusters = Vec::new();

        for i in 0..memories.len() {
            if clustered[i] {
                continue;
            }
            let mut cluster = vec![memories[i].0.clone()];
            clustered[i] = true;

            for j in 0..memories.len() {
                if i == j || clustered[j] {
                    continue;
                }
                let similarity = cosine_similarity(&memories[i].1, &memories[j].1);
                if similarity >= self.consolidation_threshold {
                    cluster.push(memories[j].0.clone());
                    clustered[j] = true;
                }
            }

            if cluster.len() > 1 {
                clusters.push(cluster);
            }
        }

        clusters
    }

    async fn merge_cluster(&self, cluster: Vec<Memory>) -> Option<ConsolidationResult> {
        let contents: Vec<String> = cluster.iter().map(|m| m.content.clone()).collect();
        let merged_content = self.merge_contents(&contents).await;

        let avg_importance = cluster.iter().map(|m| m.importance).sum::<f64>() / cluster.len() as f64;
        let max_stability = cluster.iter().fold(0.0_f64, |acc, m| acc.max(m.stability));
        let max_confidence = cluster.iter().fold(0.0_f64, |acc, m| acc.max(m.confidence));
        let total_access = cluster.iter().map(|m| m.access_count).sum();

        let mut tags: Vec<String> = cluster.iter().flat_map(|m| m.tags.clone()).collect();
        tags.sort();
        tags.dedup();

        let durability = cluster.iter().fold(cluster[0].durability, |acc, m| max_durability(acc, m.durability));

        let importance = (avg_importance + 0.1).min(1.0);
        let mut merged = Memory::new(merged_content.clone(), cluster[0].memory_type, MemorySource::Consolidation, cluster[0].domain.clone());
        merged.tags = tags;
        merged.importance = importance;
        merged.initial_importance = importance;
        merged.stability = (max_stability + 0.2).min(1.0);
        merged.confidence = max_confidence;
        merged.access_count = total_access;
        merged.parent_ids = cluster.iter().map(|m| m.id.clone()).collect();
        merged.durability = durability;

        let embedding = self.embeddings.embed(&merged_content, EmbedKind::Passage).await.ok()?;

        let store_outcome = self.vectors.store(&merged, &embedding).await.ok()?;
        if !store_outcome.created {
            // Content-hash dedup hit an existing memory; nothing to merge.
            return None;
        }
        if let Err(err) = self.graph.create_memory_node(&merged).await {
            tracing::error!(id = %merged.id, error = %err, "consolidation graph write failed, compensating");
            let _ = self.vectors.delete(&merged.id).await;
            return None;
        }

        let mut relationships_created = 0;
        for source in &cluster {
            let relationship = Relationship::new(merged.id.clone(), source.id.clone(), RelationshipType::DerivedFrom, 0.9);
            if self.graph.create_relationship(&relationship).await.is_ok() {
                relationships_created += 1;
            }
            let _ = self.vectors.mark_superseded(&source.id, &merged.id).await;
            let _ = self.graph.mark_superseded(&source.id, &merged.id).await;
        }

        let source_ids: Vec<MemoryId> = cluster.iter().map(|m| m.id.clone()).collect();
        let _ = self
            .rows
            .log_audit(&AuditEntry::new(
                "consolidate",
                Some(merged.id.clone()),
                "consolidation",
                serde_json::json!({ "source_ids": source_ids, "source_count": source_ids.len() }),
            ))
            .await;
        for source in &cluster {
            let _ = self
                .rows
                .log_audit(&AuditEntry::new("supersede", Some(source.id.clone()), "consolidation", serde_json::json!({ "superseded_by": merged.id })))
                .await;
        }

        Some(ConsolidationResult { merged_memory: merged, source_memories: source_ids, relationships_created, memories_superseded: cluster.len() })
    }

    /// Dedup near-identical fragments, then LLM-merge; falls back to a
    /// `" | "`-joined concatenation on LLM failure (spec.md §4.8 step 4).
    async fn merge_contents(&self, contents: &[String]) -> String {
        let mut unique: Vec<String> = Vec::new();
        for content in contents {
            let is_dup = unique.iter().any(|existing| content.contains(existing.as_str()) || existing.contains(content.as_str()));
            if !is_dup {
                unique.push(content.clone());
            }
        }

        if unique.len() == 1 {
            return unique.into_iter().next().unwrap();
        }

        if let Some(llm) = &self.llm {
            let numbered = unique.iter().enumerate().map(|(i, c)| format!("{}. {c}", i + 1)).collect::<Vec<_>>().join("\n");
            let prompt = format!(
                "Merge these overlapping memory fragments into a single, concise memory. \
                 Preserve all unique facts and details. Do not add information that isn't present. \
                 Return ONLY the merged text, no preamble.\n\nFragments:\n{numbered}\n\nMerged memory:"
            );
            let options = GenerateOptions { temperature: 0.1, json_mode: false, dormant_think: true };
            if let Ok(merged) = llm.generate(&prompt, options).await {
                let merged = merged.trim().to_string();
                if merged.len() > 10 {
                    return merged;
                }
            }
        }

        unique.join(" | ")
    }
}

/// Best-effort wrapper the admin CLI / scheduled task calls; never panics.
pub async fn run_consolidation(worker: &ConsolidationWorker, filters: ConsolidationFilters) -> Vec<ConsolidationResult> {
    worker.consolidate(&filters).await.unwrap_or_else(|err| {
        tracing::error!(error = %err, "consolidation run failed");
        Vec::new()
    })
}
