//! Decay worker: the "forgetting curve" (spec.md §4.7), ported from
//! `original_source/src/workers/decay.py`.

use crate::error::Result;
use crate::ids::MemoryId;
use crate::storage::{FeedbackStats, GraphStore, RowStore, VectorStore};
use crate::types::Durability;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

const HUB_FLOOR: f64 = 0.3;
const HUB_THRESHOLD: f64 = 6.0;
const CONNECTED_FLOOR: f64 = 0.15;
const CONNECTED_THRESHOLD: f64 = 3.0;
const DEFAULT_FLOOR: f64 = 0.05;
const CHANGE_EPSILON: f64 = 0.001;

/// Aggregate counters returned by a decay run. Named `stable`/`decayed`/
/// `processed` per spec.md §9 open question #1 (the source has a naming
/// inconsistency between call sites; this crate standardizes on these
/// three names everywhere, including the admin CLI and HTTP response).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DecayStats {
    pub processed: u64,
    pub decayed: u64,
    pub stable: u64,
}

/// Runs the decay worker (spec.md §4.7). A process-local lock around
/// invocations of this method is the caller's responsibility (spec.md §5):
/// concurrent runs are safe (idempotent, per-memory independent) but
/// wasteful.
pub struct DecayWorker {
    vectors: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    rows: Arc<dyn RowStore>,
    base_decay_rate: f64,
}

impl DecayWorker {
    #[must_use]
    pub fn new(vectors: Arc<dyn VectorStore>, graph: Arc<dyn GraphStore>, rows: Arc<dyn RowStore>, base_decay_rate: f64) -> Self {
        Self { vectors, graph, rows, base_decay_rate }
    }

    /// Run one decay pass. `hours_offset` simulates additional elapsed time
    /// (used by tests and the admin `/admin/decay?simulate_hours=` knob).
    pub async fn run(&self, hours_offset: f64) -> Result<DecayStats> {
        let mut stats = DecayStats::default();

        let feedback = self.rows.get_all_memory_feedback_stats().await.unwrap_or_default();
        let scrolled = self.vectors.scroll_all(false, false).await?;

        let ids: Vec<MemoryId> = scrolled.iter().map(|(m, _)| m.id.clone()).collect();
        let edge_strengths: HashMap<MemoryId, f64> = self.graph.get_bulk_edge_strengths(&ids).await.unwrap_or_default();

        let now = Utc::now();

        for (memory, _) in scrolled {
            stats.processed += 1;

            if memory.is_decay_immune() {
                stats.stable += 1;
                continue;
            }

            let durability = memory.durability;
            let hours_since = (now - memory.last_accessed).num_seconds().max(0) as f64 / 3600.0 + hours_offset;

            let mut effective_decay = self.base_decay_rate * (1.0 - memory.stability);

            let access_mod = 1.0 / (1.0 + 0.1 * memory.access_count as f64);
            effective_decay *= access_mod;

            if let Some(fb) = feedback.get(&memory.id) {
                if let Some(ratio) = fb.useful_ratio() {
                    effective_decay *= 1.0 - 0.5 * ratio;
                }
            }

            let durability_mod = if durability == Durability::Durable { 0.15 } else { 1.0 };
            effective_decay *= durability_mod;

            let mut new_importance = memory.importance * (1.0 - effective_decay).powf(hours_since);

            let total_strength = edge_strengths.get(&memory.id).copied().unwrap_or(0.0);
            let floor = if total_strength >= HUB_THRESHOLD {
                HUB_FLOOR
            } else if total_strength >= CONNECTED_THRESHOLD {
                CONNECTED_FLOOR
            } else {
                DEFAULT_FLOOR
            };
            new_importance = new_importance.max(floor);

            if (new_importance - memory.importance).abs() > CHANGE_EPSILON {
                if let Err(err) = self.vectors.update_importance(&memory.id, new_importance).await {
                    tracing::warn!(memory_id = %memory.id, error = %err, "decay vector update failed");
                    continue;
                }
                if let Err(err) = self.graph.update_importance(&memory.id, new_importance).await {
                    tracing::warn!(memory_id = %memory.id, error = %err, "decay graph update failed");
                    continue;
                }
                stats.decayed += 1;
            } else {
                stats.stable += 1;
            }
        }

        Ok(stats)
    }

    /// Exposed for tests and the `FeedbackStats`-preloading fast path the
    /// spec allows (skip the Postgres round trip when the caller already
    /// has the rollup).
    #[must_use]
    pub fn feedback_modifier(stats: &FeedbackStats) -> f64 {
        stats.useful_ratio().map_or(1.0, |ratio| 1.0 - 0.5 * ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback_modifier_favors_useful_memories() {
        let mostly_useful = FeedbackStats { useful: 9, not_useful: 1 };
        let mostly_useless = FeedbackStats { useful: 1, not_useful: 9 };
        assert!(DecayWorker::feedback_modifier(&mostly_useful) < DecayWorker::feedback_modifier(&mostly_useless));
    }

    #[test]
    fn feedback_modifier_is_neutral_with_no_feedback() {
        assert_eq!(DecayWorker::feedback_modifier(&FeedbackStats::default()), 1.0);
    }
}
