//! Feedback, pinning, durability (spec.md §4.15).
//!
//! Feedback is similarity-gated rather than explicit id-level thumbs:
//! the caller reports which memories were injected into a response plus
//! the assistant's final text, and each memory's usefulness is inferred
//! from how similar its embedding is to that text.

use crate::embeddings::{cosine_similarity, EmbedKind, EmbeddingService};
use crate::error::Result;
use crate::ids::MemoryId;
use crate::storage::{GraphStore, RowStore, VectorStore};
use crate::types::{AuditEntry, Durability};
use std::sync::Arc;

const USEFUL_THRESHOLD: f64 = 0.55;
const NOT_USEFUL_THRESHOLD: f64 = 0.25;
const USEFUL_DELTA: f64 = 0.05;
const NOT_USEFUL_DELTA: f64 = -0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackOutcome {
    Useful,
    NotUseful,
    Neutral,
    Missing,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FeedbackResult {
    pub memory_id: MemoryId,
    pub outcome: FeedbackOutcome,
    pub similarity: Option<f64>,
}

pub struct FeedbackService {
    vectors: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    rows: Arc<dyn RowStore>,
    embeddings: Arc<EmbeddingService>,
}

impl FeedbackService {
    #[must_use]
    pub fn new(vectors: Arc<dyn VectorStore>, graph: Arc<dyn GraphStore>, rows: Arc<dyn RowStore>, embeddings: Arc<EmbeddingService>) -> Self {
        Self { vectors, graph, rows, embeddings }
    }

    /// Score each injected memory's usefulness against the assistant's
    /// final response text (spec.md §4.15). `>= 0.55` similarity bumps
    /// importance by `+0.05` (capped at 1.0); `<= 0.25` drops it by `0.02`
    /// (floored at 0.0); in between is a no-op. All changes are audited.
    pub async fn submit(&self, injected_ids: &[MemoryId], assistant_text: &str, session_id: Option<&str>) -> Result<Vec<FeedbackResult>> {
        let response_embedding = self.embeddings.embed(assistant_text, EmbedKind::Passage).await?;
        let mut results = Vec::with_capacity(injected_ids.len());

        for id in injected_ids {
            let Some((embedding, memory)) = self.vectors.get(id).await? else {
                results.push(FeedbackResult { memory_id: id.clone(), outcome: FeedbackOutcome::Missing, similarity: None });
                continue;
            };

            let similarity = cosine_similarity(&embedding, &response_embedding);

            let (outcome, delta) = if similarity >= USEFUL_THRESHOLD {
                (FeedbackOutcome::Useful, USEFUL_DELTA)
            } else if similarity <= NOT_USEFUL_THRESHOLD {
                (FeedbackOutcome::NotUseful, NOT_USEFUL_DELTA)
            } else {
                (FeedbackOutcome::Neutral, 0.0)
            };

            if delta != 0.0 {
                let new_importance = (memory.importance + delta).clamp(0.0, 1.0);
                self.vectors.update_importance(id, new_importance).await?;
                self.graph.update_importance(id, new_importance).await?;

                // Enriched shape (original_source/src/core/reranker_trainer.py's
                // "Task 5 enrichment"): the full feature set a training pass
                // needs is captured here, so retrain doesn't have to fall back
                // to the legacy old_importance/old_stability-only shape.
                let mut details = serde_json::json!({
                    "similarity": similarity,
                    "old_importance": memory.importance,
                    "new_importance": new_importance,
                    "useful": outcome == FeedbackOutcome::Useful,
                    "importance": memory.importance,
                    "stability": memory.stability,
                    "confidence": memory.confidence,
                    "access_count": memory.access_count,
                    "pinned": memory.pinned,
                    "durability": memory.durability,
                });
                if let Some(session_id) = session_id {
                    details["session_id"] = serde_json::Value::String(session_id.to_string());
                }
                let mut entry = AuditEntry::new("feedback", Some(id.clone()), "feedback_service", details);
                entry.session_id = session_id.map(str::to_string);
                let _ = self.rows.log_audit(&entry).await;
            }

            results.push(FeedbackResult { memory_id: id.clone(), outcome, similarity: Some(similarity) });
        }

        Ok(results)
    }

    /// Pins a memory, making it immune to decay (spec.md §3 invariant 3).
    pub async fn pin(&self, id: &MemoryId) -> Result<()> {
        self.set_pinned(id, true).await
    }

    pub async fn unpin(&self, id: &MemoryId) -> Result<()> {
        self.set_pinned(id, false).await
    }

    async fn set_pinned(&self, id: &MemoryId, pinned: bool) -> Result<()> {
        self.vectors.set_pinned(id, pinned).await?;
        self.graph.set_pinned(id, pinned).await?;
        let action = if pinned { "pin" } else { "unpin" };
        let _ = self.rows.log_audit(&AuditEntry::new(action, Some(id.clone()), "feedback_service", serde_json::json!({ "pinned": pinned }))).await;
        Ok(())
    }

    /// Updates a memory's durability tier, auditing the change (spec.md
    /// §4.15).
    pub async fn set_durability(&self, id: &MemoryId, durability: Durability) -> Result<()> {
        self.vectors.set_durability(id, durability).await?;
        self.graph.set_durability(id, durability).await?;
        let _ = self
            .rows
            .log_audit(&AuditEntry::new("durability_change", Some(id.clone()), "feedback_service", serde_json::json!({ "durability": durability })))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_match_spec() {
        assert!((USEFUL_THRESHOLD - 0.55).abs() < f64::EPSILON);
        assert!((NOT_USEFUL_THRESHOLD - 0.25).abs() < f64::EPSILON);
        assert!((USEFUL_DELTA - 0.05).abs() < f64::EPSILON);
        assert!((NOT_USEFUL_DELTA + 0.02).abs() < f64::EPSILON);
    }
}
