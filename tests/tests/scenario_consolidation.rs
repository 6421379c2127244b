//! Scenario 6 (spec.md §8): five near-paraphrase memories consolidate into
//! one merged memory, with `derived_from` edges, superseded sources, and
//! audit rows for both sides.

mod common;

use common::Harness;
use do_memory_core::embeddings::EmbedKind;
use do_memory_core::storage::{GraphStore, VectorStore};
use do_memory_core::workers::consolidation::{ConsolidationFilters, ConsolidationWorker};
use do_memory_core::{Memory, MemorySource, MemoryType};

#[tokio::test]
async fn near_paraphrase_cluster_merges_with_derived_from_edges() {
    let harness = Harness::new();

    let contents = [
        "retry queue backoff applies after delivery failure",
        "retry queue backoff applies after delivery failure again",
        "the retry queue backoff applies after delivery failure",
        "retry queue backoff now applies after delivery failure",
        "backoff applies after delivery failure in the retry queue",
    ];

    let mut sources = Vec::new();
    for content in contents {
        let memory = Memory::new(content, MemoryType::Semantic, MemorySource::User, "messaging");
        let embedding = harness.embeddings.embed(&memory.content, EmbedKind::Passage).await.unwrap();
        harness.backend.vector.store(&memory, &embedding).await.unwrap();
        harness.backend.graph.create_memory_node(&memory).await.unwrap();
        sources.push(memory);
    }

    let worker = ConsolidationWorker::new(
        harness.backend.vector.clone(),
        harness.backend.graph.clone(),
        harness.backend.row.clone(),
        harness.embeddings.clone(),
        None,
        0.5,
        0.0,
        2,
    );

    let results = worker.consolidate(&ConsolidationFilters::default()).await.unwrap();
    assert_eq!(results.len(), 1, "the five paraphrases should collapse into one cluster");
    let result = &results[0];

    assert_eq!(result.source_memories.len(), 5);
    assert_eq!(result.memories_superseded, 5);
    assert_eq!(result.relationships_created, 5);

    assert_eq!(result.merged_memory.parent_ids.len(), 5);
    assert!((result.merged_memory.importance - 0.6).abs() < 1e-9, "avg importance 0.5 + 0.1 bump");
    assert!((result.merged_memory.stability - 0.3).abs() < 1e-9, "max stability 0.1 + 0.2 bump");
    assert_eq!(result.merged_memory.source, MemorySource::Consolidation);

    for source in &sources {
        let (stored, _) = harness.backend.vector.scroll_all(true, false).await.unwrap().into_iter().find(|(m, _)| m.id == source.id).expect("source still present");
        assert_eq!(stored.superseded_by, Some(result.merged_memory.id.clone()));
    }

    let audit = harness.backend.row.list_audit(100).await.unwrap();
    assert!(audit.iter().any(|a| a.action == "consolidate" && a.memory_id.as_ref() == Some(&result.merged_memory.id)));
    assert_eq!(audit.iter().filter(|a| a.action == "supersede").count(), 5);
}
