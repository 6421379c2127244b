//! Scenario 4 (spec.md §8): a `contradicts` edge between two results
//! causes the lower-scored side to be scaled by 0.7 relative to its
//! pre-inhibition score.

mod common;

use common::Harness;
use do_memory_core::embeddings::EmbedKind;
use do_memory_core::retrieval::MemoryQuery;
use do_memory_core::storage::{GraphStore, VectorStore};
use do_memory_core::types::{Relationship, RelationshipType};
use do_memory_core::{Memory, MemorySource, MemoryType};

#[tokio::test]
async fn contradicting_memories_both_returned_one_dampened() {
    let harness = Harness::new();

    let mut x = Memory::new("Pickle is the best choice for serialization", MemoryType::Semantic, MemorySource::User, "development");
    x.importance = 0.7;
    let mut y = Memory::new("Pickle is NOT suitable for serialization", MemoryType::Semantic, MemorySource::User, "development");
    y.importance = 0.7;

    for m in [&x, &y] {
        let embedding = harness.embeddings.embed(&m.content, EmbedKind::Passage).await.unwrap();
        harness.backend.vector.store(m, &embedding).await.unwrap();
        harness.backend.graph.create_memory_node(m).await.unwrap();
    }

    // Bidirectional contradicts edge: two directed edges of the same type.
    harness.backend.graph.create_relationship(&Relationship::new(x.id.clone(), y.id.clone(), RelationshipType::Contradicts, 1.0)).await.unwrap();
    harness.backend.graph.create_relationship(&Relationship::new(y.id.clone(), x.id.clone(), RelationshipType::Contradicts, 1.0)).await.unwrap();

    let pipeline = harness.pipeline();
    let query = MemoryQuery { text: Some("pickle serialization suitability".to_string()), limit: 10, ..Default::default() };
    let results = pipeline.retrieve(query, true).await.unwrap();

    let x_result = results.iter().find(|r| r.memory.id == x.id).expect("X present");
    let y_result = results.iter().find(|r| r.memory.id == y.id).expect("Y present");

    let lower = x_result.score.min(y_result.score);
    let higher = x_result.score.max(y_result.score);
    assert!(lower <= higher * 0.7 + 1e-9, "dampened side ({lower}) should be <= 0.7x the other side ({higher})");
}
