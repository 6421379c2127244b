//! Auto-linker: strengthens `related_to` edges between a newly stored
//! memory and its nearest semantic neighbors (spec.md §4.12), ported from
//! `original_source/src/core/auto_linker.py`.

use crate::error::Result;
use crate::ids::MemoryId;
use crate::storage::{GraphStore, SearchFilters, VectorStore};
use std::sync::Arc;

const TOP_K: usize = 3;
const MIN_SIMILARITY: f64 = 0.5;
const STRENGTH_FACTOR: f64 = 0.5;

pub struct AutoLinker {
    vectors: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
}

impl AutoLinker {
    #[must_use]
    pub fn new(vectors: Arc<dyn VectorStore>, graph: Arc<dyn GraphStore>) -> Self {
        Self { vectors, graph }
    }

    /// Link `memory_id` to its top-3 most similar existing memories
    /// (similarity >= 0.5), strengthening each `related_to` edge by
    /// `0.5 * similarity` (spec.md §4.12).
    pub async fn link(&self, memory_id: &MemoryId, embedding: &[f32]) -> Result<usize> {
        let filters = SearchFilters::default();
        let hits = self.vectors.search(embedding, TOP_K + 1, &filters).await?;

        let mut linked = 0;
        for hit in hits {
            if &hit.id == memory_id {
                continue;
            }
            if hit.similarity < MIN_SIMILARITY {
                continue;
            }
            let increment = STRENGTH_FACTOR * hit.similarity;
            self.graph.strengthen_relationship(memory_id, &hit.id, increment).await?;
            linked += 1;
            if linked >= TOP_K {
                break;
            }
        }

        Ok(linked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_match_spec() {
        assert_eq!(TOP_K, 3);
        assert!((MIN_SIMILARITY - 0.5).abs() < f64::EPSILON);
        assert!((STRENGTH_FACTOR - 0.5).abs() < f64::EPSILON);
    }
}
