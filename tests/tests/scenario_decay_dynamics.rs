//! Scenario 5 (spec.md §8): a pinned memory survives repeated decay passes
//! untouched; an unpinned memory's importance decreases monotonically but
//! never below its connectivity floor.

mod common;

use common::Harness;
use do_memory_core::embeddings::EmbedKind;
use do_memory_core::storage::{GraphStore, VectorStore};
use do_memory_core::workers::decay::DecayWorker;
use do_memory_core::{Memory, MemorySource, MemoryType};

#[tokio::test]
async fn pinned_memory_is_immune_unpinned_decays_monotonically_above_floor() {
    let harness = Harness::new();

    let mut pinned = Memory::new("Pinned fact about the deploy pipeline", MemoryType::Semantic, MemorySource::User, "ops");
    pinned.pinned = true;
    let mut floating = Memory::new("Some transient observation about load", MemoryType::Episodic, MemorySource::User, "ops");
    floating.pinned = false;

    for m in [&pinned, &floating] {
        let embedding = harness.embeddings.embed(&m.content, EmbedKind::Passage).await.unwrap();
        harness.backend.vector.store(m, &embedding).await.unwrap();
        harness.backend.graph.create_memory_node(m).await.unwrap();
    }

    let worker = DecayWorker::new(harness.backend.vector.clone(), harness.backend.graph.clone(), harness.backend.row.clone(), 0.01);

    let original_pinned_importance = pinned.importance;
    let mut previous_floating_importance = floating.importance;

    for _ in 0..3 {
        let stats = worker.run(48.0).await.unwrap();
        assert_eq!(stats.processed, 2);

        let (current_pinned, _) = harness.backend.vector.scroll_all(false, false).await.unwrap().into_iter().find(|(m, _)| m.id == pinned.id).expect("pinned memory present");
        assert!((current_pinned.importance - original_pinned_importance).abs() < 0.01, "pinned importance drifted to {}", current_pinned.importance);

        let (current_floating, _) = harness.backend.vector.scroll_all(false, false).await.unwrap().into_iter().find(|(m, _)| m.id == floating.id).expect("floating memory present");
        assert!(current_floating.importance <= previous_floating_importance, "unpinned importance should not increase");
        assert!(current_floating.importance >= 0.05 - 1e-9, "unpinned importance must respect the connectivity floor");
        previous_floating_importance = current_floating.importance;
    }

    assert!(previous_floating_importance < floating.importance, "unpinned importance should have decreased overall");
}
